//! Contract invocations prepared by a wallet and fee-sponsored by the distribution account.
use std::sync::Arc;

use async_trait::async_trait;
use soroban_rs::xdr::{
    HostFunction, InvokeHostFunctionOp, Limits, Memo, Operation, OperationBody, ReadXdr,
    ScAddress, SorobanCredentials, TransactionEnvelope,
};
use tracing::debug;

use super::{
    common::{apply_simulation, build_transaction, simulate},
    HandlerMonitor, ReconciliationOutcome, TransactionHandler,
};
use crate::{
    domain::{HandlerError, SubmitterEngine},
    models::{
        CompletedStatus, EventMessage, EventValidationError, SponsoredDetails, Transaction,
        TransactionType, TxJob,
    },
    utils::{is_valid_contract_address, parse_account_id, parse_muxed_account},
};

pub struct SponsoredTransactionHandler {
    engine: Arc<SubmitterEngine>,
    monitor: HandlerMonitor,
}

impl SponsoredTransactionHandler {
    pub fn new(engine: Arc<SubmitterEngine>, monitor: HandlerMonitor) -> Self {
        Self { engine, monitor }
    }

    fn sponsored_details(job: &TxJob) -> Result<&SponsoredDetails, HandlerError> {
        job.transaction.details.as_sponsored().ok_or_else(|| {
            HandlerError::Unsupported(format!(
                "transaction {} is not a sponsored transaction",
                job.transaction.id
            ))
        })
    }
}

/// Decodes the wallet's operation and checks it only invokes a contract.
fn decode_sponsored_operation(
    details: &SponsoredDetails,
) -> Result<InvokeHostFunctionOp, HandlerError> {
    if details.sponsored_account.is_empty() {
        return Err(HandlerError::InvalidPayload(
            "sponsored account cannot be empty".to_string(),
        ));
    }
    if details.sponsored_operation_xdr.is_empty() {
        return Err(HandlerError::InvalidPayload(
            "sponsored operation XDR cannot be empty".to_string(),
        ));
    }
    if !is_valid_contract_address(&details.sponsored_account) {
        return Err(HandlerError::InvalidPayload(
            "sponsored account is not a valid contract address".to_string(),
        ));
    }

    let operation =
        InvokeHostFunctionOp::from_xdr_base64(&details.sponsored_operation_xdr, Limits::none())
            .map_err(|e| {
                HandlerError::InvalidPayload(format!("sponsored operation XDR is not valid: {e}"))
            })?;

    match &operation.host_function {
        HostFunction::InvokeContract(_) => Ok(operation),
        other => Err(HandlerError::InvalidPayload(format!(
            "unsupported host function type: {}",
            other.name()
        ))),
    }
}

/// Rejects authorization that would make the service's own accounts sign
/// for the wallet's operation.
fn check_authorization(
    operation: &InvokeHostFunctionOp,
    channel_account: &str,
    distribution_account: &str,
) -> Result<(), HandlerError> {
    if operation.auth.is_empty() {
        return Ok(());
    }
    let channel_account = parse_account_id(channel_account).map_err(HandlerError::InvalidPayload)?;
    let distribution_account =
        parse_account_id(distribution_account).map_err(HandlerError::InvalidPayload)?;

    for entry in operation.auth.iter() {
        let SorobanCredentials::Address(credentials) = &entry.credentials else {
            return Err(HandlerError::InvalidPayload(
                "invalid auth credentials type".to_string(),
            ));
        };
        if let ScAddress::Account(account) = &credentials.address {
            if *account == channel_account {
                return Err(HandlerError::InvalidPayload(
                    "sponsored operation cannot require authorization from channel account"
                        .to_string(),
                ));
            }
            if *account == distribution_account {
                return Err(HandlerError::InvalidPayload(
                    "sponsored operation cannot require authorization from distribution account"
                        .to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl TransactionHandler for SponsoredTransactionHandler {
    async fn build_inner_transaction(
        &self,
        job: &TxJob,
        channel_account_sequence: i64,
        distribution_account: &str,
    ) -> Result<TransactionEnvelope, HandlerError> {
        let details = Self::sponsored_details(job)?;
        let sponsored_operation = decode_sponsored_operation(details)?;
        check_authorization(
            &sponsored_operation,
            &job.channel_account.public_key,
            distribution_account,
        )?;
        let rpc = self.engine.soroban()?;

        let operation = Operation {
            source_account: Some(
                parse_muxed_account(distribution_account).map_err(HandlerError::InvalidPayload)?,
            ),
            body: OperationBody::InvokeHostFunction(sponsored_operation),
        };
        let mut envelope = build_transaction(
            job,
            channel_account_sequence,
            self.engine.max_base_fee,
            Memo::None,
            vec![operation],
        )?;

        debug!(sponsored_account = %details.sponsored_account, "simulating sponsored transaction");
        let response = simulate(rpc, &envelope).await?;
        apply_simulation(&mut envelope, &response, self.engine.max_base_fee, false)?;
        Ok(envelope)
    }

    fn build_success_event(&self, job: &TxJob) -> Result<EventMessage, EventValidationError> {
        EventMessage::transaction_completed(&job.transaction, CompletedStatus::Success, "")
    }

    fn build_failure_event(
        &self,
        job: &TxJob,
        error: &str,
    ) -> Result<EventMessage, EventValidationError> {
        EventMessage::transaction_completed(&job.transaction, CompletedStatus::Failed, error)
    }

    fn requires_rebuild_on_retry(&self) -> bool {
        false
    }

    fn transaction_type(&self) -> TransactionType {
        TransactionType::Sponsored
    }

    fn context_fields(&self, transaction: &Transaction) -> Vec<(&'static str, String)> {
        transaction
            .details
            .as_sponsored()
            .map(|details| vec![("sponsored_account", details.sponsored_account.clone())])
            .unwrap_or_default()
    }

    fn monitor_processing_started(&self, job: &TxJob, event_id: &str) {
        self.monitor.processing_started(job, event_id);
    }

    fn monitor_processing_success(&self, job: &TxJob, event_id: &str) {
        self.monitor.processing_success(job, event_id);
    }

    fn monitor_processing_failed(
        &self,
        job: &TxJob,
        event_id: &str,
        is_retryable: bool,
        is_horizon_error: bool,
        error_stack: &str,
    ) {
        self.monitor
            .processing_failed(job, event_id, is_retryable, is_horizon_error, error_stack);
    }

    fn monitor_reconciliation_success(
        &self,
        job: &TxJob,
        event_id: &str,
        outcome: ReconciliationOutcome,
    ) {
        self.monitor.reconciliation_success(job, event_id, outcome);
    }

    fn monitor_reconciliation_failure(
        &self,
        job: &TxJob,
        event_id: &str,
        is_horizon_error: bool,
        error_stack: &str,
    ) {
        self.monitor
            .reconciliation_failure(job, event_id, is_horizon_error, error_stack);
    }
}
