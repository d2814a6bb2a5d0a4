use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Failed to connect to the database: {0}")]
    ConnectionError(String),

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("there are no channel accounts available to process transactions")]
    InsufficientChannelAccounts,

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("An unknown error occurred: {0}")]
    Unknown(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}
