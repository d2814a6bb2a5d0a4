//! Shared builders for unit tests.
use soroban_rs::xdr::{
    Asset, ContractId, Hash, HostFunction, InvokeContractArgs, InvokeHostFunctionOp, Limits, Memo,
    MuxedAccount, Operation, OperationBody, PaymentOp, Preconditions, ScAddress, ScSymbol,
    SequenceNumber, Transaction as XdrTransaction, TransactionEnvelope, TransactionExt,
    TransactionResult, TransactionResultExt, TransactionResultResult, TransactionV1Envelope,
    Uint256, VecM, WriteXdr,
};

use super::{
    ChannelAccount, MemoType, PaymentDetails, SponsoredDetails, TransactionDetails,
    WalletCreationDetails,
};

pub const ACCOUNT_ADDRESS: &str = "GAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQDZ7H";
pub const OTHER_ACCOUNT_ADDRESS: &str = "GABAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEJXA";
pub const DESTINATION_ADDRESS: &str = "GDUKMGUGDZQK6YHYA5Z6AY2G4XDSZPSZ3SW5UN3ARVMO6QSRDWP5YLEX";
pub const USDC_ISSUER: &str = "GBBD47IF6LWK7P7MDEVSCWR7DPUWV3NY3DTQEVFL4NAT4AQH3ZLLFLA5";
pub const CONTRACT_ADDRESS: &str = "CAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQC526";
/// Seed whose raw bytes are all `1`.
pub const SECRET_SEED: &str = "SAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQC5MY";

pub fn payment_details() -> TransactionDetails {
    TransactionDetails::Payment(PaymentDetails {
        asset_code: "USDC".to_string(),
        asset_issuer: USDC_ISSUER.to_string(),
        amount: "100".to_string(),
        destination: DESTINATION_ADDRESS.to_string(),
        memo: None,
        memo_type: None,
    })
}

pub fn payment_details_with_memo(memo: &str, memo_type: MemoType) -> TransactionDetails {
    let mut details = payment_details();
    if let TransactionDetails::Payment(ref mut payment) = details {
        payment.memo = Some(memo.to_string());
        payment.memo_type = Some(memo_type);
    }
    details
}

pub fn wallet_public_key_hex() -> String {
    let mut key = vec![0x04];
    key.extend([7u8; 64]);
    hex::encode(key)
}

pub fn wallet_creation_details() -> TransactionDetails {
    TransactionDetails::WalletCreation(WalletCreationDetails {
        public_key: wallet_public_key_hex(),
        wasm_hash: hex::encode([9u8; 32]),
    })
}

pub fn sponsored_operation(auth: VecM<soroban_rs::xdr::SorobanAuthorizationEntry>) -> InvokeHostFunctionOp {
    InvokeHostFunctionOp {
        host_function: HostFunction::InvokeContract(InvokeContractArgs {
            contract_address: ScAddress::Contract(ContractId(Hash([1u8; 32]))),
            function_name: ScSymbol("execute".try_into().unwrap()),
            args: VecM::default(),
        }),
        auth,
    }
}

pub fn sponsored_details() -> TransactionDetails {
    TransactionDetails::Sponsored(SponsoredDetails {
        sponsored_account: CONTRACT_ADDRESS.to_string(),
        sponsored_operation_xdr: sponsored_operation(VecM::default())
            .to_xdr_base64(Limits::none())
            .unwrap(),
    })
}

pub fn channel_account(public_key: &str) -> ChannelAccount {
    ChannelAccount::new(public_key, None)
}

pub fn signed_envelope() -> TransactionEnvelope {
    TransactionEnvelope::Tx(TransactionV1Envelope {
        tx: XdrTransaction {
            source_account: MuxedAccount::Ed25519(Uint256([1u8; 32])),
            fee: 100,
            seq_num: SequenceNumber(2),
            cond: Preconditions::None,
            memo: Memo::None,
            operations: vec![Operation {
                source_account: None,
                body: OperationBody::Payment(PaymentOp {
                    destination: MuxedAccount::Ed25519(Uint256([2u8; 32])),
                    asset: Asset::Native,
                    amount: 10,
                }),
            }]
            .try_into()
            .unwrap(),
            ext: TransactionExt::V0,
        },
        signatures: VecM::default(),
    })
}

pub fn signed_envelope_xdr() -> String {
    signed_envelope().to_xdr_base64(Limits::none()).unwrap()
}

pub fn result_xdr(success: bool) -> String {
    let result = if success {
        TransactionResultResult::TxSuccess(VecM::default())
    } else {
        TransactionResultResult::TxFailed(VecM::default())
    };
    TransactionResult {
        fee_charged: 100,
        result,
        ext: TransactionResultExt::V0,
    }
    .to_xdr_base64(Limits::none())
    .unwrap()
}
