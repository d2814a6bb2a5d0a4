use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignerError {
    #[error("Failed to sign transaction: {0}")]
    SigningError(String),

    #[error("Invalid key format: {0}")]
    KeyError(String),

    #[error("Signer for account {0} not found")]
    UnknownAccount(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Conversion error: {0}")]
    ConversionError(String),
}
