//! Stellar transaction signers.
//!
//! Two signers take part in every submission: the channel account signer
//! signs the inner transaction for the sequence-number source, and the
//! distribution account signer signs both the inner transaction (operation
//! source) and the fee-bump wrapper (fee source).

mod channel_account_signer;
mod distribution_signer;

pub use channel_account_signer::*;
pub use distribution_signer::*;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
#[cfg(test)]
use mockall::automock;
use sha2::{Digest, Sha256};
use soroban_rs::xdr::{
    BytesM, DecoratedSignature, Limits, Signature, SignatureHint, TransactionEnvelope, WriteXdr,
};
use zeroize::Zeroize;

use crate::models::SignerError;
use crate::utils::{network_id, signature_payload};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait StellarSignTrait: Send + Sync {
    /// Appends a signature for every account in `accounts` to `envelope`.
    ///
    /// Works for both v1 and fee-bump envelopes.
    async fn sign_envelope(
        &self,
        envelope: TransactionEnvelope,
        network_passphrase: &str,
        accounts: &[String],
    ) -> Result<TransactionEnvelope, SignerError>;
}

/// Decodes an `S...` seed into an ed25519 signing key.
pub fn signing_key_from_seed(seed: &str) -> Result<SigningKey, SignerError> {
    let mut private_key = stellar_strkey::ed25519::PrivateKey::from_string(seed)
        .map_err(|e| SignerError::KeyError(format!("invalid secret seed: {e}")))?;
    let signing_key = SigningKey::from_bytes(&private_key.0);
    private_key.0.zeroize();
    Ok(signing_key)
}

/// `G...` address of a signing key.
pub fn account_address(signing_key: &SigningKey) -> String {
    stellar_strkey::ed25519::PublicKey(signing_key.verifying_key().to_bytes()).to_string()
}

/// Signs `envelope` with `signing_key` and appends the decorated signature.
pub(crate) fn sign_with_key(
    envelope: TransactionEnvelope,
    network_passphrase: &str,
    signing_key: &SigningKey,
) -> Result<TransactionEnvelope, SignerError> {
    let payload = signature_payload(&envelope, &network_id(network_passphrase))
        .map_err(|e| SignerError::SigningError(e.to_string()))?;
    let payload_bytes = payload
        .to_xdr(Limits::none())
        .map_err(|e| SignerError::ConversionError(e.to_string()))?;
    let digest: [u8; 32] = Sha256::digest(&payload_bytes).into();

    let signature = signing_key.sign(&digest);
    let public_key = signing_key.verifying_key().to_bytes();
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public_key[28..]);

    let decorated = DecoratedSignature {
        hint: SignatureHint(hint),
        signature: Signature(
            BytesM::try_from(signature.to_bytes().to_vec())
                .map_err(|e| SignerError::ConversionError(e.to_string()))?,
        ),
    };

    append_signature(envelope, decorated)
}

fn append_signature(
    mut envelope: TransactionEnvelope,
    signature: DecoratedSignature,
) -> Result<TransactionEnvelope, SignerError> {
    let signatures = match &mut envelope {
        TransactionEnvelope::Tx(e) => &mut e.signatures,
        TransactionEnvelope::TxFeeBump(e) => &mut e.signatures,
        TransactionEnvelope::TxV0(_) => {
            return Err(SignerError::SigningError(
                "v0 envelopes are not supported".to_string(),
            ))
        }
    };

    let mut updated = signatures.to_vec();
    updated.push(signature);
    *signatures = updated
        .try_into()
        .map_err(|_| SignerError::SigningError("too many signatures".to_string()))?;
    Ok(envelope)
}
