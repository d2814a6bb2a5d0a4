//! Completion messages published once a transaction reaches a terminal state.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use super::{Transaction, TransactionType};

pub const PAYMENT_COMPLETED_TOPIC: &str = "events.payment.payment_completed";
pub const WALLET_CREATION_COMPLETED_TOPIC: &str = "events.wallet_creation.wallet_creation_completed";
pub const SPONSORED_TRANSACTION_COMPLETED_TOPIC: &str =
    "events.sponsored_transaction.sponsored_transaction_completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletedStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCompletedData {
    pub transaction_id: String,
    pub external_id: String,
    pub status: CompletedStatus,
    pub status_message: String,
    pub completed_at: DateTime<Utc>,
    pub stellar_transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub topic: String,
    pub key: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: TransactionCompletedData,
}

#[derive(Debug, Error, PartialEq)]
pub enum EventValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl EventMessage {
    /// Builds the completion message of `transaction` for its type's topic.
    pub fn transaction_completed(
        transaction: &Transaction,
        status: CompletedStatus,
        status_message: &str,
    ) -> Result<Self, EventValidationError> {
        let topic = completed_topic(transaction.transaction_type());
        let suffix = match status {
            CompletedStatus::Success => "success",
            CompletedStatus::Failed => "error",
        };
        let msg = Self {
            topic: topic.to_string(),
            key: transaction.external_id.clone(),
            tenant_id: transaction.tenant_id.clone(),
            event_type: format!("{}_completed_{}", transaction.transaction_type().label(), suffix),
            data: TransactionCompletedData {
                transaction_id: transaction.id.clone(),
                external_id: transaction.external_id.clone(),
                status,
                status_message: status_message.to_string(),
                completed_at: Utc::now(),
                stellar_transaction_id: transaction
                    .stellar_transaction_hash
                    .clone()
                    .unwrap_or_default(),
            },
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.topic.is_empty() {
            return Err(EventValidationError::MissingField("topic"));
        }
        if self.key.is_empty() {
            return Err(EventValidationError::MissingField("key"));
        }
        if self.tenant_id.is_empty() {
            return Err(EventValidationError::MissingField("tenant ID"));
        }
        if self.event_type.is_empty() {
            return Err(EventValidationError::MissingField("type"));
        }
        if self.data.transaction_id.is_empty() {
            return Err(EventValidationError::MissingField("transaction ID"));
        }
        Ok(())
    }
}

pub fn completed_topic(transaction_type: TransactionType) -> &'static str {
    match transaction_type {
        TransactionType::Payment => PAYMENT_COMPLETED_TOPIC,
        TransactionType::WalletCreation => WALLET_CREATION_COMPLETED_TOPIC,
        TransactionType::Sponsored => SPONSORED_TRANSACTION_COMPLETED_TOPIC,
    }
}
