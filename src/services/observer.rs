//! Structured logging and metrics for the transaction lifecycle.
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use strum::Display;
use tracing::{error, info, warn};

use crate::metrics::{RECONCILIATION_ERRORS, TRANSACTION_EVENTS, TRANSACTION_PROCESSING_SECONDS};
use crate::models::{Transaction, TransactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionEvent {
    ProcessingStarted,
    ProcessingSuccessful,
    ReprocessingSuccessful,
    Failed,
    MarkedForReprocessing,
    ReconciliationSuccessful,
    ReconciliationMarkedForReprocessing,
    ReconciliationUnexpectedError,
}

impl TransactionEvent {
    /// Label such as `payment_processing_started`.
    pub fn label(&self, transaction_type: TransactionType) -> String {
        format!("{}_{}", transaction_type.label(), self)
    }

    /// Outcome recorded in the processing time histogram, for events that
    /// end a processing attempt.
    fn outcome(&self) -> Option<&'static str> {
        match self {
            TransactionEvent::ProcessingSuccessful
            | TransactionEvent::ReprocessingSuccessful
            | TransactionEvent::ReconciliationSuccessful => Some("success"),
            TransactionEvent::Failed => Some("error"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxMetadata {
    /// Id of the worker run.
    pub event_id: String,
    pub channel_account: String,
    pub is_horizon_error: bool,
    pub error_stack: Option<String>,
    pub event: TransactionEvent,
}

#[cfg_attr(test, automock)]
pub trait TransactionObserver: Send + Sync {
    fn log_and_monitor_transaction(&self, transaction: &Transaction, metadata: &TxMetadata);
}

/// Logs every event and feeds the Prometheus registry.
#[derive(Debug, Default, Clone)]
pub struct MetricsTransactionObserver;

impl TransactionObserver for MetricsTransactionObserver {
    fn log_and_monitor_transaction(&self, transaction: &Transaction, metadata: &TxMetadata) {
        let transaction_type = transaction.transaction_type();
        let label = metadata.event.label(transaction_type);
        let event = metadata.event.to_string();

        TRANSACTION_EVENTS
            .with_label_values(&[transaction_type.label(), event.as_str()])
            .inc();

        if let Some(outcome) = metadata.event.outcome() {
            let elapsed = (Utc::now() - transaction.created_at)
                .to_std()
                .unwrap_or_default()
                .as_secs_f64();
            TRANSACTION_PROCESSING_SECONDS
                .with_label_values(&[transaction_type.label(), outcome])
                .observe(elapsed);
        }

        match metadata.event {
            TransactionEvent::ReconciliationUnexpectedError => {
                RECONCILIATION_ERRORS
                    .with_label_values(&[transaction_type.label()])
                    .inc();
                error!(
                    event = %label,
                    event_id = %metadata.event_id,
                    tx_id = %transaction.id,
                    channel_account = %metadata.channel_account,
                    is_horizon_error = metadata.is_horizon_error,
                    error = metadata.error_stack.as_deref().unwrap_or_default(),
                    "transaction reconciliation failed"
                );
            }
            TransactionEvent::Failed | TransactionEvent::MarkedForReprocessing => {
                warn!(
                    event = %label,
                    event_id = %metadata.event_id,
                    tx_id = %transaction.id,
                    channel_account = %metadata.channel_account,
                    is_horizon_error = metadata.is_horizon_error,
                    attempts = transaction.attempts_count,
                    error = metadata.error_stack.as_deref().unwrap_or_default(),
                    "transaction processing failed"
                );
            }
            _ => {
                info!(
                    event = %label,
                    event_id = %metadata.event_id,
                    tx_id = %transaction.id,
                    channel_account = %metadata.channel_account,
                    attempts = transaction.attempts_count,
                    "transaction event"
                );
            }
        }
    }
}
