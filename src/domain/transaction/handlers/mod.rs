//! Per-type strategies that turn a job into an unsigned inner transaction.
//!
//! The worker owns the shared lifecycle (signing, fee bump, submission and
//! reconciliation). A handler only knows how to build its transaction type,
//! which events it emits and how it is monitored.
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use soroban_rs::xdr::TransactionEnvelope;

use super::{HandlerError, SubmitterEngine};
use crate::{
    models::{EventMessage, EventValidationError, Transaction, TransactionType, TxJob},
    services::TransactionObserver,
};

mod common;
pub use common::{HandlerMonitor, ReconciliationOutcome};

mod payment;
pub use payment::*;

mod wallet_creation;
pub use wallet_creation::*;

mod sponsored;
pub use sponsored::*;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    /// Builds the inner transaction sourced from the job's channel account.
    async fn build_inner_transaction(
        &self,
        job: &TxJob,
        channel_account_sequence: i64,
        distribution_account: &str,
    ) -> Result<TransactionEnvelope, HandlerError>;

    fn build_success_event(&self, job: &TxJob) -> Result<EventMessage, EventValidationError>;

    fn build_failure_event(
        &self,
        job: &TxJob,
        error: &str,
    ) -> Result<EventMessage, EventValidationError>;

    /// Whether a retried job must be rebuilt instead of resubmitted as is.
    fn requires_rebuild_on_retry(&self) -> bool;

    fn transaction_type(&self) -> TransactionType;

    /// Extra fields attached to the worker's log span.
    fn context_fields(&self, transaction: &Transaction) -> Vec<(&'static str, String)>;

    fn monitor_processing_started(&self, job: &TxJob, event_id: &str);

    fn monitor_processing_success(&self, job: &TxJob, event_id: &str);

    fn monitor_processing_failed(
        &self,
        job: &TxJob,
        event_id: &str,
        is_retryable: bool,
        is_horizon_error: bool,
        error_stack: &str,
    );

    fn monitor_reconciliation_success(
        &self,
        job: &TxJob,
        event_id: &str,
        outcome: ReconciliationOutcome,
    );

    fn monitor_reconciliation_failure(
        &self,
        job: &TxJob,
        event_id: &str,
        is_horizon_error: bool,
        error_stack: &str,
    );
}

/// One handler per transaction type, shared by all workers.
#[derive(Clone)]
pub struct HandlerSet {
    payment: Arc<dyn TransactionHandler>,
    wallet_creation: Arc<dyn TransactionHandler>,
    sponsored: Arc<dyn TransactionHandler>,
}

impl HandlerSet {
    pub fn new(engine: Arc<SubmitterEngine>, observer: Arc<dyn TransactionObserver>) -> Self {
        let monitor = HandlerMonitor::new(observer);
        Self {
            payment: Arc::new(PaymentTransactionHandler::new(
                engine.clone(),
                monitor.clone(),
            )),
            wallet_creation: Arc::new(WalletCreationTransactionHandler::new(
                engine.clone(),
                monitor.clone(),
            )),
            sponsored: Arc::new(SponsoredTransactionHandler::new(engine, monitor)),
        }
    }

    #[cfg(test)]
    pub(crate) fn single(handler: Arc<dyn TransactionHandler>) -> Self {
        Self {
            payment: handler.clone(),
            wallet_creation: handler.clone(),
            sponsored: handler,
        }
    }

    pub fn handler_for(&self, transaction_type: TransactionType) -> Arc<dyn TransactionHandler> {
        match transaction_type {
            TransactionType::Payment => self.payment.clone(),
            TransactionType::WalletCreation => self.wallet_creation.clone(),
            TransactionType::Sponsored => self.sponsored.clone(),
        }
    }
}
