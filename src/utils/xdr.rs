//! Envelope hashing, fee-bump wrapping and contract id derivation.
use sha2::{Digest, Sha256};
use soroban_rs::xdr::{
    ContractIdPreimage, FeeBumpTransaction, FeeBumpTransactionEnvelope, FeeBumpTransactionExt,
    FeeBumpTransactionInnerTx, Hash, HashIdPreimage, HashIdPreimageContractId, Limits,
    MuxedAccount, TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, VecM, WriteXdr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XdrError {
    #[error("XDR encoding error: {0}")]
    Encoding(#[from] soroban_rs::xdr::Error),

    #[error("unsupported envelope: {0}")]
    UnsupportedEnvelope(String),

    #[error("fee overflow: {0}")]
    FeeOverflow(String),
}

pub fn network_id(passphrase: &str) -> Hash {
    Hash(Sha256::digest(passphrase.as_bytes()).into())
}

/// Payload signed by every signer of `envelope`.
pub fn signature_payload(
    envelope: &TransactionEnvelope,
    network_id: &Hash,
) -> Result<TransactionSignaturePayload, XdrError> {
    let tagged_transaction = match envelope {
        TransactionEnvelope::Tx(e) => TransactionSignaturePayloadTaggedTransaction::Tx(e.tx.clone()),
        TransactionEnvelope::TxFeeBump(e) => {
            TransactionSignaturePayloadTaggedTransaction::TxFeeBump(e.tx.clone())
        }
        TransactionEnvelope::TxV0(_) => {
            return Err(XdrError::UnsupportedEnvelope(
                "v0 envelopes are not produced by this service".to_string(),
            ))
        }
    };

    Ok(TransactionSignaturePayload {
        network_id: network_id.clone(),
        tagged_transaction,
    })
}

/// Network hash of the envelope, the id Horizon reports it under.
pub fn envelope_hash(envelope: &TransactionEnvelope, network_id: &Hash) -> Result<Hash, XdrError> {
    let payload = signature_payload(envelope, network_id)?;
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Hash(Sha256::digest(&bytes).into()))
}

/// Resource fee attached by simulation, zero for classic transactions.
pub fn resource_fee(envelope: &TransactionEnvelope) -> i64 {
    match envelope {
        TransactionEnvelope::Tx(e) => match &e.tx.ext {
            TransactionExt::V1(data) => data.resource_fee,
            TransactionExt::V0 => 0,
        },
        _ => 0,
    }
}

/// Wraps a signed inner transaction in an unsigned fee-bump envelope.
///
/// The outer fee is `base_fee * (operations + 1)` plus the inner resource fee.
pub fn fee_bump_envelope(
    inner: TransactionEnvelope,
    fee_source: MuxedAccount,
    base_fee: i64,
) -> Result<TransactionEnvelope, XdrError> {
    let resource_fee = resource_fee(&inner);
    let inner = match inner {
        TransactionEnvelope::Tx(e) => e,
        _ => {
            return Err(XdrError::UnsupportedEnvelope(
                "only v1 transactions can be fee bumped".to_string(),
            ))
        }
    };

    let operations = inner.tx.operations.len() as i64;
    let fee = base_fee
        .checked_mul(operations + 1)
        .and_then(|fee| fee.checked_add(resource_fee))
        .ok_or_else(|| XdrError::FeeOverflow(format!("base fee {base_fee}")))?;

    Ok(TransactionEnvelope::TxFeeBump(FeeBumpTransactionEnvelope {
        tx: FeeBumpTransaction {
            fee_source,
            fee,
            inner_tx: FeeBumpTransactionInnerTx::Tx(inner),
            ext: FeeBumpTransactionExt::V0,
        },
        signatures: VecM::default(),
    }))
}

/// Deterministic contract id for a deployment preimage on a network.
pub fn contract_id(network_id: &Hash, preimage: ContractIdPreimage) -> Result<Hash, XdrError> {
    let preimage = HashIdPreimage::ContractId(HashIdPreimageContractId {
        network_id: network_id.clone(),
        contract_id_preimage: preimage,
    });
    let bytes = preimage.to_xdr(Limits::none())?;
    Ok(Hash(Sha256::digest(&bytes).into()))
}
