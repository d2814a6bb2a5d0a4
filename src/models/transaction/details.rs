use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Payment,
    WalletCreation,
    Sponsored,
}

impl TransactionType {
    /// Lowercase label used for metrics and monitoring tags.
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payment",
            TransactionType::WalletCreation => "wallet_creation",
            TransactionType::Sponsored => "sponsored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemoType {
    Text,
    Id,
    Hash,
    Return,
}

/// Value transfer from the distribution account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub asset_code: String,
    pub asset_issuer: String,
    /// Decimal amount with at most 7 fractional digits.
    pub amount: String,
    /// Classic account (`G...`) or contract (`C...`).
    pub destination: String,
    pub memo: Option<String>,
    pub memo_type: Option<MemoType>,
}

/// Deployment of a smart wallet contract for a passkey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletCreationDetails {
    /// Hex encoded uncompressed secp256r1 key.
    pub public_key: String,
    pub wasm_hash: String,
}

/// Contract invocation prepared by a wallet and relayed by the distribution account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsoredDetails {
    pub sponsored_account: String,
    /// Base64 `InvokeHostFunctionOp`.
    pub sponsored_operation_xdr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDetails {
    Payment(PaymentDetails),
    WalletCreation(WalletCreationDetails),
    Sponsored(SponsoredDetails),
}

impl TransactionDetails {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionDetails::Payment(_) => TransactionType::Payment,
            TransactionDetails::WalletCreation(_) => TransactionType::WalletCreation,
            TransactionDetails::Sponsored(_) => TransactionType::Sponsored,
        }
    }

    pub fn as_payment(&self) -> Option<&PaymentDetails> {
        match self {
            TransactionDetails::Payment(details) => Some(details),
            _ => None,
        }
    }

    pub fn as_wallet_creation(&self) -> Option<&WalletCreationDetails> {
        match self {
            TransactionDetails::WalletCreation(details) => Some(details),
            _ => None,
        }
    }

    pub fn as_sponsored(&self) -> Option<&SponsoredDetails> {
        match self {
            TransactionDetails::Sponsored(details) => Some(details),
            _ => None,
        }
    }
}
