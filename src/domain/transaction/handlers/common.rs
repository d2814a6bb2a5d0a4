//! Building blocks shared by the transaction handlers.
use std::sync::Arc;

use chrono::Utc;
use soroban_rs::{
    stellar_rpc_client::SimulateTransactionResponse,
    xdr::{
        Duration as XdrDuration, LedgerBounds, Limits, Memo, Operation, OperationBody,
        Preconditions, PreconditionsV2, ReadXdr, SequenceNumber, SorobanAuthorizationEntry,
        SorobanTransactionData, TimeBounds, TimePoint, Transaction, TransactionEnvelope,
        TransactionExt, TransactionV1Envelope, VecM,
    },
};
use tracing::{debug, warn};

use crate::{
    constants::TRANSACTION_TIMEOUT_SECONDS,
    domain::{HandlerError, RpcErrorWrapper},
    models::TxJob,
    services::{SorobanRpcTrait, TransactionEvent, TransactionObserver, TxMetadata},
    utils::parse_muxed_account,
};

/// Outcome of a reconciliation that did not hit an unexpected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// The network reported the transaction as successful.
    Successful,
    /// The transaction never landed and goes back to the pool.
    MarkedForReprocessing,
}

/// Builds the unsigned inner transaction sourced from the channel account.
///
/// The sequence is `channel_account_sequence + 1`, the validity window is
/// [`TRANSACTION_TIMEOUT_SECONDS`] and the max ledger bound is the job lock.
pub(crate) fn build_transaction(
    job: &TxJob,
    channel_account_sequence: i64,
    base_fee: u32,
    memo: Memo,
    operations: Vec<Operation>,
) -> Result<TransactionEnvelope, HandlerError> {
    let source_account = parse_muxed_account(&job.channel_account.public_key)
        .map_err(HandlerError::InvalidPayload)?;
    let sequence = channel_account_sequence.checked_add(1).ok_or_else(|| {
        HandlerError::InvalidPayload(format!(
            "channel account sequence {channel_account_sequence} cannot be incremented"
        ))
    })?;
    let fee = u32::try_from(operations.len())
        .ok()
        .and_then(|ops| base_fee.checked_mul(ops))
        .ok_or_else(|| HandlerError::Xdr(format!("fee overflow for base fee {base_fee}")))?;
    let max_time = (Utc::now().timestamp().max(0) as u64) + TRANSACTION_TIMEOUT_SECONDS;

    let tx = Transaction {
        source_account,
        fee,
        seq_num: SequenceNumber(sequence),
        cond: Preconditions::V2(PreconditionsV2 {
            time_bounds: Some(TimeBounds {
                min_time: TimePoint(0),
                max_time: TimePoint(max_time),
            }),
            ledger_bounds: Some(LedgerBounds {
                min_ledger: 0,
                max_ledger: job.locked_until_ledger_number,
            }),
            min_seq_num: None,
            min_seq_age: XdrDuration(0),
            min_seq_ledger_gap: 0,
            extra_signers: VecM::default(),
        }),
        memo,
        operations: operations
            .try_into()
            .map_err(|_| HandlerError::Xdr("too many operations".to_string()))?,
        ext: TransactionExt::V0,
    };

    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: VecM::default(),
    }))
}

/// Simulates a draft transaction and turns any failure into an RPC error.
pub(crate) async fn simulate(
    rpc: &Arc<dyn SorobanRpcTrait>,
    envelope: &TransactionEnvelope,
) -> Result<SimulateTransactionResponse, HandlerError> {
    let response = rpc
        .simulate_transaction_envelope(envelope)
        .await
        .map_err(|e| RpcErrorWrapper::from_provider_error(&e))?;

    if let Some(error) = response.error.as_deref().filter(|e| !e.is_empty()) {
        warn!(error = %error, "transaction simulation failed");
        return Err(RpcErrorWrapper::from_simulation_error(error).into());
    }

    debug!(
        min_resource_fee = response.min_resource_fee,
        "transaction simulated"
    );
    Ok(response)
}

/// Authorization entries returned for the first simulated host function.
pub(crate) fn simulated_auth(
    response: &SimulateTransactionResponse,
) -> Result<Vec<SorobanAuthorizationEntry>, HandlerError> {
    let Some(result) = response.results.first() else {
        return Ok(Vec::new());
    };
    result
        .auth
        .iter()
        .map(|entry| {
            SorobanAuthorizationEntry::from_xdr_base64(entry, Limits::none()).map_err(|e| {
                HandlerError::Xdr(format!("unmarshalling authorization entry: {e}"))
            })
        })
        .collect()
}

/// Rebuilds a simulated draft into its final form.
///
/// When `replace_auth` is set, the simulated authorization entries replace
/// the ones of the invoke operation. The fee becomes
/// `base_fee * operations + resource fee`.
pub(crate) fn apply_simulation(
    envelope: &mut TransactionEnvelope,
    response: &SimulateTransactionResponse,
    base_fee: u32,
    replace_auth: bool,
) -> Result<(), HandlerError> {
    let TransactionEnvelope::Tx(env) = envelope else {
        return Err(HandlerError::Xdr(
            "simulated transactions must be v1 envelopes".to_string(),
        ));
    };

    if replace_auth {
        let auth: VecM<SorobanAuthorizationEntry> = simulated_auth(response)?
            .try_into()
            .map_err(|_| HandlerError::Xdr("too many authorization entries".to_string()))?;
        let mut operations = env.tx.operations.to_vec();
        for operation in operations.iter_mut() {
            if let OperationBody::InvokeHostFunction(op) = &mut operation.body {
                op.auth = auth.clone();
            }
        }
        env.tx.operations = operations
            .try_into()
            .map_err(|_| HandlerError::Xdr("too many operations".to_string()))?;
    }

    let mut resource_fee: i64 = 0;
    if !response.transaction_data.is_empty() {
        let data =
            SorobanTransactionData::from_xdr_base64(&response.transaction_data, Limits::none())
                .map_err(|e| HandlerError::Xdr(format!("unmarshalling transaction data: {e}")))?;
        resource_fee = data.resource_fee;
        env.tx.ext = TransactionExt::V1(data);
    }

    let operations = u32::try_from(env.tx.operations.len()).unwrap_or(u32::MAX);
    env.tx.fee = u32::try_from(resource_fee)
        .ok()
        .and_then(|resource_fee| {
            base_fee
                .checked_mul(operations)
                .and_then(|fee| fee.checked_add(resource_fee))
        })
        .ok_or_else(|| {
            HandlerError::Xdr(format!(
                "fee overflow for base fee {base_fee} and resource fee {resource_fee}"
            ))
        })?;
    Ok(())
}

/// Reports lifecycle events of a job to the observer under the handler's type.
#[derive(Clone)]
pub struct HandlerMonitor {
    observer: Arc<dyn TransactionObserver>,
}

impl HandlerMonitor {
    pub fn new(observer: Arc<dyn TransactionObserver>) -> Self {
        Self { observer }
    }

    fn emit(
        &self,
        job: &TxJob,
        event_id: &str,
        event: TransactionEvent,
        is_horizon_error: bool,
        error_stack: Option<&str>,
    ) {
        self.observer.log_and_monitor_transaction(
            &job.transaction,
            &TxMetadata {
                event_id: event_id.to_string(),
                channel_account: job.channel_account.public_key.clone(),
                is_horizon_error,
                error_stack: error_stack.map(str::to_string),
                event,
            },
        );
    }

    pub fn processing_started(&self, job: &TxJob, event_id: &str) {
        self.emit(job, event_id, TransactionEvent::ProcessingStarted, false, None);
    }

    pub fn processing_success(&self, job: &TxJob, event_id: &str) {
        let event = if job.transaction.attempts_count > 1 {
            TransactionEvent::ReprocessingSuccessful
        } else {
            TransactionEvent::ProcessingSuccessful
        };
        self.emit(job, event_id, event, false, None);
    }

    pub fn processing_failed(
        &self,
        job: &TxJob,
        event_id: &str,
        is_retryable: bool,
        is_horizon_error: bool,
        error_stack: &str,
    ) {
        let event = if is_retryable {
            TransactionEvent::MarkedForReprocessing
        } else {
            TransactionEvent::Failed
        };
        self.emit(job, event_id, event, is_horizon_error, Some(error_stack));
    }

    pub fn reconciliation_success(
        &self,
        job: &TxJob,
        event_id: &str,
        outcome: ReconciliationOutcome,
    ) {
        let event = match outcome {
            ReconciliationOutcome::Successful => TransactionEvent::ReconciliationSuccessful,
            ReconciliationOutcome::MarkedForReprocessing => {
                TransactionEvent::ReconciliationMarkedForReprocessing
            }
        };
        self.emit(job, event_id, event, false, None);
    }

    pub fn reconciliation_failure(
        &self,
        job: &TxJob,
        event_id: &str,
        is_horizon_error: bool,
        error_stack: &str,
    ) {
        self.emit(
            job,
            event_id,
            TransactionEvent::ReconciliationUnexpectedError,
            is_horizon_error,
            Some(error_stack),
        );
    }
}
