use thiserror::Error;

/// Rejections raised when a transaction row is validated before insertion.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionValidationError {
    #[error("external ID is required")]
    MissingExternalId,

    #[error("tenant ID is required")]
    MissingTenantId,

    #[error("invalid asset code: {0}")]
    InvalidAssetCode(String),

    #[error("invalid asset issuer: {0}")]
    InvalidAssetIssuer(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid memo: {0}")]
    InvalidMemo(String),

    #[error("public key is required")]
    MissingPublicKey,

    #[error("wasm hash is required")]
    MissingWasmHash,

    #[error("{field} must be hex encoded: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("invalid sponsored account: {0}")]
    InvalidSponsoredAccount(String),

    #[error("invalid sponsored operation XDR: {0}")]
    InvalidSponsoredOperation(String),
}
