use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl TransactionStatus {
    /// Checks the status machine `Pending -> Processing -> {Success | Error}`.
    ///
    /// `Error -> Pending` is never allowed in place: a retry inserts a new row.
    pub fn can_transition_to(&self, target: TransactionStatus) -> Result<(), RepositoryError> {
        use TransactionStatus::*;

        match (self, target) {
            (Pending, Processing) | (Processing, Success) | (Processing, Error) => Ok(()),
            (from, to) => Err(RepositoryError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Pending and Processing rows are eligible for a worker.
    pub fn is_processable(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Error)
    }
}
