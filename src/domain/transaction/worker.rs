//! Runs one locked job to completion.
//!
//! A worker validates the job, then either submits a freshly built
//! fee-bump transaction or reconciles the outcome of a previous submission.
//! The hash and outbound XDR are always persisted before the envelope is
//! sent, so an interrupted run can be resolved by hash on the next pass.
use std::sync::Arc;

use soroban_rs::xdr::{Limits, TransactionEnvelope, WriteXdr};
use tracing::{error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::{
    HandlerError, HorizonErrorWrapper, ReconciliationOutcome, SubmissionError, SubmitterEngine,
    TransactionError, TransactionHandler,
};
use crate::{
    models::{EventMessage, EventValidationError, TxJob},
    repositories::{ChannelAccountStore, TransactionStore},
    services::{
        provider::{HorizonTransactionResponse, ProviderError},
        CrashTracker, EventProducer, TransactionProcessingLimiter,
    },
    utils::{envelope_hash, fee_bump_envelope, parse_muxed_account},
};

/// Process-wide collaborators handed to every worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: Arc<SubmitterEngine>,
    pub transactions: Arc<dyn TransactionStore>,
    pub channel_accounts: Arc<dyn ChannelAccountStore>,
    pub limiter: Arc<TransactionProcessingLimiter>,
    pub crash_tracker: Arc<dyn CrashTracker>,
    /// Completion events are dropped, with an error log, when unset.
    pub event_producer: Option<Arc<dyn EventProducer>>,
}

pub struct TransactionWorker {
    context: WorkerContext,
    handler: Arc<dyn TransactionHandler>,
    event_id: String,
}

impl TransactionWorker {
    pub fn new(context: WorkerContext, handler: Arc<dyn TransactionHandler>) -> Self {
        Self {
            context,
            handler,
            event_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Processes `job`, logging any error it ends with.
    pub async fn run(&self, mut job: TxJob) {
        let span = self.job_span(&job);
        async {
            if let Err(error) = self.run_job(&mut job).await {
                error!(error = %error, "handle unexpected error");
            }
        }
        .instrument(span)
        .await
    }

    fn job_span(&self, job: &TxJob) -> Span {
        let transaction = &job.transaction;
        let span = info_span!(
            "tx_job",
            event_id = %self.event_id,
            channel_account = %job.channel_account.public_key,
            tx_id = %transaction.id,
            tenant_id = %transaction.tenant_id,
            transaction_type = self.handler.transaction_type().label(),
            created_at = %transaction.created_at,
            updated_at = %transaction.updated_at,
            tx_hash = field::Empty,
            xdr_sent = field::Empty,
            xdr_received = field::Empty,
            asset = field::Empty,
            destination_account = field::Empty,
            memo = field::Empty,
            memo_type = field::Empty,
            public_key = field::Empty,
            wasm_hash = field::Empty,
            sponsored_account = field::Empty,
        );

        if let Some(hash) = &transaction.stellar_transaction_hash {
            span.record("tx_hash", hash.as_str());
        }
        if let Some(xdr) = &transaction.xdr_sent {
            span.record("xdr_sent", xdr.as_str());
        }
        if let Some(xdr) = &transaction.xdr_received {
            span.record("xdr_received", xdr.as_str());
        }
        for (name, value) in self.handler.context_fields(transaction) {
            span.record(name, value.as_str());
        }
        span
    }

    async fn run_job(&self, job: &mut TxJob) -> Result<(), TransactionError> {
        self.validate_job(job).await?;

        match job.transaction.stellar_transaction_hash.clone() {
            Some(hash) => self.reconcile_submitted_transaction(job, &hash).await,
            None => self.process_transaction_submission(job).await,
        }
    }

    /// Checks the job is still processable and both of its locks cover the
    /// current ledger.
    async fn validate_job(&self, job: &TxJob) -> Result<(), TransactionError> {
        if !job.transaction.status.is_processable() {
            return Err(TransactionError::InvalidJob(format!(
                "invalid transaction status: {}",
                job.transaction.status
            )));
        }

        let current_ledger_number = self
            .context
            .engine
            .ledger_number_tracker
            .get_ledger_number()
            .await
            .map_err(TransactionError::LedgerNumber)?;

        if !job.transaction.is_locked(current_ledger_number) {
            return Err(TransactionError::InvalidJob(
                "transaction should be locked".to_string(),
            ));
        }
        if !job.channel_account.is_locked(current_ledger_number) {
            return Err(TransactionError::InvalidJob(
                "channel account should be locked".to_string(),
            ));
        }
        Ok(())
    }

    async fn process_transaction_submission(
        &self,
        job: &mut TxJob,
    ) -> Result<(), TransactionError> {
        info!("processing transaction submission");
        self.handler
            .monitor_processing_started(job, &self.event_id);

        let envelope_xdr = self.prepare_for_submission(job).await?;
        self.submit(job, &envelope_xdr).await
    }

    /// Builds the signed fee-bump envelope and records its hash on the row.
    async fn prepare_for_submission(&self, job: &mut TxJob) -> Result<String, TransactionError> {
        let (envelope, distribution_account) = self.build_and_sign_transaction(job).await?;

        let hash = envelope_hash(&envelope, &self.context.engine.network_id())
            .map_err(|e| TransactionError::FeeBump(format!("hashing envelope: {e}")))?;
        let hash = hex::encode(hash.0);
        let envelope_xdr = envelope
            .to_xdr_base64(Limits::none())
            .map_err(|e| TransactionError::FeeBump(format!("encoding envelope: {e}")))?;

        job.transaction = self
            .context
            .transactions
            .update_stellar_transaction_hash_and_xdr_sent(
                &job.transaction.id,
                &hash,
                &envelope_xdr,
                &distribution_account,
            )
            .await?;
        Span::current().record("tx_hash", hash.as_str());

        Ok(envelope_xdr)
    }

    /// Returns the signed fee-bump envelope and the distribution account paying for it.
    async fn build_and_sign_transaction(
        &self,
        job: &TxJob,
    ) -> Result<(TransactionEnvelope, String), TransactionError> {
        let engine = &self.context.engine;
        let tenant_id = &job.transaction.tenant_id;

        let distribution_account = engine
            .distribution_resolver
            .distribution_account(tenant_id)
            .await
            .map_err(|e| TransactionError::DistributionAccount {
                tenant_id: tenant_id.clone(),
                reason: e.to_string(),
            })?;
        if !distribution_account.is_stellar() {
            return Err(TransactionError::UnsupportedDistributionAccount(format!(
                "expected distribution account to be a STELLAR account but got {:?}",
                distribution_account.account_type.to_string()
            )));
        }
        let distribution_account = distribution_account.address;
        let channel_account = &job.channel_account.public_key;

        let sequence = engine
            .horizon
            .get_account_sequence(channel_account)
            .await
            .map_err(|e| TransactionError::ChannelAccountSequence(HorizonErrorWrapper::new(e)))?;

        let inner = match self
            .handler
            .build_inner_transaction(job, sequence, &distribution_account)
            .await
        {
            Ok(inner) => inner,
            Err(error) => {
                if let HandlerError::Rpc(rpc_error) = &error {
                    self.context
                        .limiter
                        .adjust_limit_if_needed(&SubmissionError::Rpc(rpc_error.clone()));
                }
                return Err(error.into());
            }
        };

        let passphrase = &engine.network_passphrase;
        let distribution_signers = std::slice::from_ref(&distribution_account);
        let inner = engine
            .channel_signer
            .sign_envelope(inner, passphrase, std::slice::from_ref(channel_account))
            .await?;
        let inner = engine
            .distribution_signer
            .sign_envelope(inner, passphrase, distribution_signers)
            .await?;

        let fee_source =
            parse_muxed_account(&distribution_account).map_err(TransactionError::FeeBump)?;
        let fee_bump = fee_bump_envelope(inner, fee_source, i64::from(engine.max_base_fee))
            .map_err(|e| TransactionError::FeeBump(e.to_string()))?;
        let fee_bump = engine
            .distribution_signer
            .sign_envelope(fee_bump, passphrase, distribution_signers)
            .await?;

        Ok((fee_bump, distribution_account))
    }

    async fn submit(&self, job: &mut TxJob, envelope_xdr: &str) -> Result<(), TransactionError> {
        match self
            .context
            .engine
            .horizon
            .submit_transaction_xdr(envelope_xdr)
            .await
        {
            Ok(response) => {
                self.handle_successful_transaction(job, &response).await?;
                self.handler
                    .monitor_processing_success(job, &self.event_id);
                Ok(())
            }
            Err(error) => {
                self.handle_failed_transaction(job, HorizonErrorWrapper::new(error))
                    .await
            }
        }
    }

    /// Marks the row successful, publishes the completion event and releases
    /// both locks.
    async fn handle_successful_transaction(
        &self,
        job: &mut TxJob,
        response: &HorizonTransactionResponse,
    ) -> Result<(), TransactionError> {
        self.save_response_xdr_if_present(job, &response.result_xdr)
            .await?;
        if !response.successful {
            return Err(TransactionError::UnsuccessfulTransaction(
                response.hash.clone(),
            ));
        }

        job.transaction = self
            .context
            .transactions
            .update_status_to_success(&job.transaction.id)
            .await?;
        self.produce_completed_event(self.handler.build_success_event(job))
            .await;
        self.unlock_job(job).await;

        info!(tx_hash = %response.hash, "successfully processed transaction job");
        Ok(())
    }

    /// Classifies a rejected submission. Terminal failures mark the row as
    /// errored; anything else leaves it for the next scheduler pass.
    async fn handle_failed_transaction(
        &self,
        job: &mut TxJob,
        error: HorizonErrorWrapper,
    ) -> Result<(), TransactionError> {
        error!(error = %error, "error processing job");

        if let Some(result_xdr) = &error.result_xdr {
            self.save_response_xdr_if_present(job, result_xdr).await?;
        }

        self.context
            .limiter
            .adjust_limit_if_needed(&SubmissionError::Horizon(error.clone()));

        let is_horizon_error = error.is_horizon_error();
        let should_mark_as_error = is_horizon_error && error.should_mark_as_error();
        let marked = if should_mark_as_error {
            self.mark_as_error(job, &error).await
        } else {
            Ok(())
        };

        self.handler.monitor_processing_failed(
            job,
            &self.event_id,
            !should_mark_as_error,
            is_horizon_error,
            &error.to_string(),
        );
        marked?;

        // A definitive rejection never lands, so stale simulation data can be
        // dropped now instead of waiting for reconciliation to miss the hash.
        if !should_mark_as_error
            && error.has_result_codes()
            && self.handler.requires_rebuild_on_retry()
        {
            job.transaction = self
                .context
                .transactions
                .prepare_transaction_for_reprocessing(&job.transaction.id)
                .await?;
            // the row lock is already released and may belong to another job now
            self.unlock_channel_account(job).await;
            return Ok(());
        }

        self.unlock_job(job).await;
        Ok(())
    }

    async fn mark_as_error(
        &self,
        job: &mut TxJob,
        error: &HorizonErrorWrapper,
    ) -> Result<(), TransactionError> {
        let message = error.to_string();
        job.transaction = self
            .context
            .transactions
            .update_status_to_error(&job.transaction.id, &message)
            .await?;
        self.produce_completed_event(self.handler.build_failure_event(job, &message))
            .await;

        // the receiving side not being ready is an expected end-user condition
        if !error.is_destination_account_not_ready() {
            self.context
                .crash_tracker
                .log_and_report_errors(&message, "transaction error - cannot be retried");
        }
        Ok(())
    }

    /// Resolves a job whose envelope was already sent, looking it up by hash.
    async fn reconcile_submitted_transaction(
        &self,
        job: &mut TxJob,
        hash: &str,
    ) -> Result<(), TransactionError> {
        info!(tx_hash = %hash, "reconciling previously submitted transaction");

        let response = match self.context.engine.horizon.get_transaction(hash).await {
            Ok(response) => response,
            Err(error) => {
                let error = HorizonErrorWrapper::new(error);
                if error.is_not_found() {
                    return self.mark_for_reprocessing(job).await;
                }
                return Err(self.unexpected_reconciliation_error(job, error));
            }
        };

        if !response.successful {
            let error = HorizonErrorWrapper::new(ProviderError::Other(format!(
                "transaction {hash} was found on the ledger but was not successful"
            )));
            return Err(self.unexpected_reconciliation_error(job, error));
        }

        if let Err(error) = self.handle_successful_transaction(job, &response).await {
            self.handler.monitor_reconciliation_failure(
                job,
                &self.event_id,
                false,
                &error.to_string(),
            );
            return Err(error);
        }

        self.handler.monitor_reconciliation_success(
            job,
            &self.event_id,
            ReconciliationOutcome::Successful,
        );
        Ok(())
    }

    async fn mark_for_reprocessing(&self, job: &mut TxJob) -> Result<(), TransactionError> {
        warn!("previous transaction did not make it through, marking it for resubmission");

        job.transaction = self
            .context
            .transactions
            .prepare_transaction_for_reprocessing(&job.transaction.id)
            .await?;
        self.unlock_channel_account(job).await;

        self.handler.monitor_reconciliation_success(
            job,
            &self.event_id,
            ReconciliationOutcome::MarkedForReprocessing,
        );
        Ok(())
    }

    /// The job stays locked until its ledger bound passes.
    fn unexpected_reconciliation_error(
        &self,
        job: &TxJob,
        error: HorizonErrorWrapper,
    ) -> TransactionError {
        warn!(error = %error, "received unexpected horizon error");
        self.handler.monitor_reconciliation_failure(
            job,
            &self.event_id,
            true,
            &error.to_string(),
        );
        TransactionError::UnexpectedReconciliation(SubmissionError::Horizon(error))
    }

    async fn save_response_xdr_if_present(
        &self,
        job: &mut TxJob,
        result_xdr: &str,
    ) -> Result<(), TransactionError> {
        if result_xdr.is_empty() {
            return Ok(());
        }
        job.transaction = self
            .context
            .transactions
            .update_stellar_transaction_xdr_received(&job.transaction.id, result_xdr)
            .await?;
        Ok(())
    }

    async fn produce_completed_event(&self, event: Result<EventMessage, EventValidationError>) {
        let message = match event {
            Ok(message) => message,
            Err(error) => {
                error!(error = %error, "building transaction completed event");
                return;
            }
        };

        let Some(producer) = &self.context.event_producer else {
            error!(
                topic = %message.topic,
                key = %message.key,
                "event producer is not configured, could not publish message"
            );
            return;
        };

        if let Err(error) = producer.write_messages(std::slice::from_ref(&message)).await {
            error!(error = %error, topic = %message.topic, "writing message on event producer");
        }
    }

    /// Releases both locks. Failures only delay the next pick-up until the
    /// locks expire.
    async fn unlock_job(&self, job: &mut TxJob) {
        self.unlock_channel_account(job).await;

        match self.context.transactions.unlock(&job.transaction.id).await {
            Ok(transaction) => job.transaction = transaction,
            Err(error) => warn!(error = %error, "unlocking transaction"),
        }
    }

    /// Used alone once `prepare_transaction_for_reprocessing` has cleared the
    /// row lock.
    async fn unlock_channel_account(&self, job: &TxJob) {
        if let Err(error) = self
            .context
            .channel_accounts
            .unlock(&job.channel_account.public_key)
            .await
        {
            warn!(error = %error, "unlocking channel account");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        domain::{test_support::EngineMocks, MockTransactionHandler, RpcErrorWrapper},
        models::{
            fixtures::{
                channel_account, payment_details, result_xdr, signed_envelope,
                signed_envelope_xdr, ACCOUNT_ADDRESS, OTHER_ACCOUNT_ADDRESS,
            },
            CompletedStatus, DistributionAccount, DistributionAccountType, Transaction, TransactionStatus,
            TransactionType,
        },
        models::{ChannelAccount, RepositoryError},
        repositories::{JobStore, SubmissionStores},
        services::{
            provider::{HorizonProblem, HorizonProblemExtras, HorizonResultCodes},
            MockCrashTracker, MockEventProducer,
        },
    };

    const CURRENT_LEDGER: u32 = 100;

    fn horizon_problem(status: u16, tx_code: Option<&str>, op_codes: &[&str]) -> ProviderError {
        let result_codes = (tx_code.is_some() || !op_codes.is_empty()).then(|| HorizonResultCodes {
            transaction: tx_code.map(str::to_string),
            inner_transaction: None,
            operations: op_codes.iter().map(|c| c.to_string()).collect(),
        });
        ProviderError::Horizon(Box::new(HorizonProblem {
            problem_type: "https://stellar.org/horizon-errors/transaction_failed".to_string(),
            title: "Transaction Failed".to_string(),
            status,
            detail: String::new(),
            extras: Some(HorizonProblemExtras {
                result_codes,
                result_xdr: Some(result_xdr(false)),
                envelope_xdr: None,
            }),
        }))
    }

    fn not_found() -> ProviderError {
        ProviderError::Horizon(Box::new(HorizonProblem {
            problem_type: "https://stellar.org/horizon-errors/not_found".to_string(),
            title: "Resource Missing".to_string(),
            status: 404,
            ..Default::default()
        }))
    }

    fn success_response(hash: &str) -> HorizonTransactionResponse {
        HorizonTransactionResponse {
            hash: hash.to_string(),
            successful: true,
            result_xdr: result_xdr(true),
            envelope_xdr: String::new(),
            ledger: CURRENT_LEDGER,
        }
    }

    /// Engine mocks for a job that gets as far as submission.
    fn submitting_engine() -> EngineMocks {
        let mut mocks = EngineMocks::default().with_distribution_account(OTHER_ACCOUNT_ADDRESS);
        mocks
            .ledger_number_tracker
            .expect_get_ledger_number()
            .returning(|| Ok(CURRENT_LEDGER));
        mocks
            .horizon
            .expect_get_account_sequence()
            .returning(|_| Ok(41));
        mocks
            .channel_signer
            .expect_sign_envelope()
            .withf(|_, _, accounts| *accounts == [ACCOUNT_ADDRESS.to_string()])
            .times(1)
            .returning(|envelope, _, _| Ok(envelope));
        mocks
            .distribution_signer
            .expect_sign_envelope()
            .withf(|_, _, accounts| *accounts == [OTHER_ACCOUNT_ADDRESS.to_string()])
            .times(2)
            .returning(|envelope, _, _| Ok(envelope));
        mocks
    }

    fn reconciling_engine() -> EngineMocks {
        let mut mocks = EngineMocks::default();
        mocks
            .ledger_number_tracker
            .expect_get_ledger_number()
            .returning(|| Ok(CURRENT_LEDGER));
        mocks
    }

    fn payment_handler() -> MockTransactionHandler {
        let mut handler = MockTransactionHandler::new();
        handler
            .expect_transaction_type()
            .return_const(TransactionType::Payment);
        handler.expect_context_fields().returning(|_| Vec::new());
        handler.expect_requires_rebuild_on_retry().return_const(false);
        handler
            .expect_build_inner_transaction()
            .returning(|_, _, _| Ok(signed_envelope()));
        handler
            .expect_build_success_event()
            .returning(|job| {
                EventMessage::transaction_completed(&job.transaction, CompletedStatus::Success, "")
            });
        handler.expect_build_failure_event().returning(|job, error| {
            EventMessage::transaction_completed(&job.transaction, CompletedStatus::Failed, error)
        });
        handler.expect_monitor_processing_started().return_const(());
        handler
    }

    fn producer(times: usize) -> MockEventProducer {
        let mut producer = MockEventProducer::new();
        producer
            .expect_write_messages()
            .times(times)
            .returning(|_| Ok(()));
        producer
    }

    fn crash_tracker(times: usize) -> MockCrashTracker {
        let mut tracker = MockCrashTracker::new();
        tracker
            .expect_log_and_report_errors()
            .withf(|_, message| message == "transaction error - cannot be retried")
            .times(times)
            .return_const(());
        tracker
    }

    fn worker(
        stores: &SubmissionStores,
        mocks: EngineMocks,
        handler: MockTransactionHandler,
        producer: MockEventProducer,
        crash_tracker: MockCrashTracker,
    ) -> TransactionWorker {
        let context = WorkerContext {
            engine: Arc::new(mocks.into_engine()),
            transactions: stores.transactions.clone(),
            channel_accounts: stores.channel_accounts.clone(),
            limiter: Arc::new(TransactionProcessingLimiter::new(4)),
            crash_tracker: Arc::new(crash_tracker),
            event_producer: Some(Arc::new(producer)),
        };
        TransactionWorker::new(context, Arc::new(handler))
    }

    async fn locked_job(stores: &SubmissionStores) -> TxJob {
        stores
            .transactions
            .insert(Transaction::new("payment-1", "tenant-1", payment_details()))
            .await
            .unwrap();
        stores
            .channel_accounts
            .insert(channel_account(ACCOUNT_ADDRESS))
            .await
            .unwrap();
        let mut jobs = stores
            .jobs
            .load_and_lock_tuples(CURRENT_LEDGER, CURRENT_LEDGER + 10, 1)
            .await
            .unwrap();
        jobs.remove(0)
    }

    /// A job whose envelope was already sent under `hash`.
    async fn submitted_job(stores: &SubmissionStores, hash: &str) -> TxJob {
        let mut job = locked_job(stores).await;
        job.transaction = stores
            .transactions
            .update_stellar_transaction_hash_and_xdr_sent(
                &job.transaction.id,
                hash,
                &signed_envelope_xdr(),
                OTHER_ACCOUNT_ADDRESS,
            )
            .await
            .unwrap();
        job
    }

    /// Runs another selection right after each channel account unlock, the
    /// way a concurrent poll would.
    struct SelectOnUnlock {
        inner: Arc<dyn ChannelAccountStore>,
        jobs: Arc<dyn JobStore>,
        selected: Mutex<Vec<TxJob>>,
    }

    impl SelectOnUnlock {
        fn new(stores: &SubmissionStores) -> Self {
            Self {
                inner: stores.channel_accounts.clone(),
                jobs: stores.jobs.clone(),
                selected: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChannelAccountStore for SelectOnUnlock {
        async fn insert(&self, account: ChannelAccount) -> Result<ChannelAccount, RepositoryError> {
            self.inner.insert(account).await
        }

        async fn get(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError> {
            self.inner.get(public_key).await
        }

        async fn get_all(&self) -> Result<Vec<ChannelAccount>, RepositoryError> {
            self.inner.get_all().await
        }

        async fn count(&self) -> Result<usize, RepositoryError> {
            self.inner.count().await
        }

        async fn delete(&self, public_key: &str) -> Result<(), RepositoryError> {
            self.inner.delete(public_key).await
        }

        async fn lock(
            &self,
            public_key: &str,
            current_ledger_number: u32,
            lock_to_ledger_number: u32,
        ) -> Result<ChannelAccount, RepositoryError> {
            self.inner
                .lock(public_key, current_ledger_number, lock_to_ledger_number)
                .await
        }

        async fn unlock(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError> {
            let account = self.inner.unlock(public_key).await?;
            let jobs = self
                .jobs
                .load_and_lock_tuples(CURRENT_LEDGER, CURRENT_LEDGER + 10, 1)
                .await?;
            self.selected.lock().unwrap().extend(jobs);
            Ok(account)
        }
    }

    fn interleaved_worker(
        stores: &SubmissionStores,
        channel_accounts: Arc<SelectOnUnlock>,
        mocks: EngineMocks,
        handler: MockTransactionHandler,
    ) -> TransactionWorker {
        let context = WorkerContext {
            engine: Arc::new(mocks.into_engine()),
            transactions: stores.transactions.clone(),
            channel_accounts,
            limiter: Arc::new(TransactionProcessingLimiter::new(4)),
            crash_tracker: Arc::new(crash_tracker(0)),
            event_producer: Some(Arc::new(producer(0))),
        };
        TransactionWorker::new(context, Arc::new(handler))
    }

    async fn assert_unlocked(stores: &SubmissionStores, job: &TxJob) -> Transaction {
        let channel = stores
            .channel_accounts
            .get(&job.channel_account.public_key)
            .await
            .unwrap();
        assert!(channel.locked_until_ledger_number.is_none());
        let transaction = stores.transactions.get(&job.transaction.id).await.unwrap();
        assert!(transaction.locked_until_ledger_number.is_none());
        transaction
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let stores = SubmissionStores::in_memory();
        let job = locked_job(&stores).await;

        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .times(1)
            .returning(|_| Ok(success_response(&"a".repeat(64))));
        let mut handler = payment_handler();
        handler
            .expect_monitor_processing_success()
            .times(1)
            .return_const(());

        worker(&stores, mocks, handler, producer(1), crash_tracker(0))
            .run(job.clone())
            .await;

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Success);
        assert_eq!(transaction.attempts_count, 1);
        assert_eq!(transaction.xdr_received, Some(result_xdr(true)));
        assert_eq!(
            transaction.distribution_account.as_deref(),
            Some(OTHER_ACCOUNT_ADDRESS)
        );
        assert_eq!(transaction.stellar_transaction_hash.map(|h| h.len()), Some(64));
    }

    #[tokio::test]
    async fn test_hash_is_persisted_before_submission() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let submitted = Arc::new(Mutex::new(None));
        let captured = submitted.clone();
        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .times(1)
            .returning(move |xdr| {
                *captured.lock().unwrap() = Some(xdr.to_string());
                Err(ProviderError::Timeout)
            });
        let mut handler = payment_handler();
        handler
            .expect_monitor_processing_failed()
            .withf(|_, _, retryable, horizon_error, _| *retryable && !*horizon_error)
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Processing);
        assert!(transaction.stellar_transaction_hash.is_some());
        assert_eq!(transaction.xdr_sent, *submitted.lock().unwrap());
    }

    #[tokio::test]
    async fn test_retryable_failure_unlocks_without_report() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .returning(|_| Err(horizon_problem(400, Some("tx_too_late"), &[])));
        let mut handler = payment_handler();
        handler
            .expect_monitor_processing_failed()
            .withf(|_, _, retryable, horizon_error, stack| {
                *retryable && *horizon_error && stack.contains("tx_too_late")
            })
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Processing);
        assert_eq!(transaction.xdr_received, Some(result_xdr(false)));
        assert!(transaction.stellar_transaction_hash.is_some());
    }

    #[tokio::test]
    async fn test_retryable_failure_clears_hash_when_rebuild_is_required() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .returning(|_| Err(horizon_problem(400, Some("tx_bad_seq"), &[])));
        let mut handler = MockTransactionHandler::new();
        handler.expect_requires_rebuild_on_retry().return_const(true);
        handler
            .expect_build_inner_transaction()
            .returning(|_, _, _| Ok(signed_envelope()));
        handler.expect_monitor_processing_started().return_const(());
        handler
            .expect_monitor_processing_failed()
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert!(transaction.stellar_transaction_hash.is_none());
        assert!(transaction.xdr_sent.is_none());
    }

    #[tokio::test]
    async fn test_rebuild_keeps_lock_taken_by_next_selection() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;
        let channel_accounts = Arc::new(SelectOnUnlock::new(&stores));

        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .returning(|_| Err(horizon_problem(400, Some("tx_bad_seq"), &[])));
        let mut handler = MockTransactionHandler::new();
        handler.expect_requires_rebuild_on_retry().return_const(true);
        handler
            .expect_build_inner_transaction()
            .returning(|_, _, _| Ok(signed_envelope()));
        handler.expect_monitor_processing_started().return_const(());
        handler
            .expect_monitor_processing_failed()
            .times(1)
            .return_const(());

        let worker = interleaved_worker(&stores, channel_accounts.clone(), mocks, handler);
        worker.run_job(&mut job).await.unwrap();

        let selected = channel_accounts.selected.lock().unwrap().clone();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].transaction.id, job.transaction.id);

        let transaction = stores.transactions.get(&job.transaction.id).await.unwrap();
        assert_eq!(
            transaction.locked_until_ledger_number,
            Some(CURRENT_LEDGER + 10)
        );
        assert!(transaction.stellar_transaction_hash.is_none());
    }

    #[tokio::test]
    async fn test_terminal_failure_for_destination_is_not_reported() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = submitting_engine();
        mocks.horizon.expect_submit_transaction_xdr().returning(|_| {
            Err(horizon_problem(400, Some("tx_failed"), &["op_no_trust"]))
        });
        let mut handler = payment_handler();
        handler
            .expect_monitor_processing_failed()
            .withf(|_, _, retryable, horizon_error, _| !*retryable && *horizon_error)
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(1), crash_tracker(0));
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Error);
        assert!(transaction
            .status_message
            .unwrap()
            .contains("operation codes: [ op_no_trust ]"));
    }

    #[tokio::test]
    async fn test_terminal_failure_is_reported() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .returning(|_| Err(horizon_problem(400, Some("tx_bad_auth"), &[])));
        let mut handler = payment_handler();
        handler
            .expect_monitor_processing_failed()
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(1), crash_tracker(1));
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Error);
    }

    #[tokio::test]
    async fn test_build_error_keeps_job_locked() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = EngineMocks::default().with_distribution_account(OTHER_ACCOUNT_ADDRESS);
        mocks
            .ledger_number_tracker
            .expect_get_ledger_number()
            .returning(|| Ok(CURRENT_LEDGER));
        mocks
            .horizon
            .expect_get_account_sequence()
            .returning(|_| Ok(41));
        mocks.horizon.expect_submit_transaction_xdr().never();
        let mut handler = MockTransactionHandler::new();
        handler.expect_monitor_processing_started().return_const(());
        handler.expect_build_inner_transaction().returning(|_, _, _| {
            Err(HandlerError::Rpc(RpcErrorWrapper::from_simulation_error(
                "HostError: Error(Contract, #3)",
            )))
        });

        let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        let err = worker.run_job(&mut job).await.unwrap_err();
        assert!(matches!(err, TransactionError::Build(HandlerError::Rpc(_))));

        let transaction = stores.transactions.get(&job.transaction.id).await.unwrap();
        assert_eq!(
            transaction.locked_until_ledger_number,
            Some(CURRENT_LEDGER + 10)
        );
        assert!(transaction.stellar_transaction_hash.is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_stellar_distribution_account() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = EngineMocks::default();
        mocks
            .ledger_number_tracker
            .expect_get_ledger_number()
            .returning(|| Ok(CURRENT_LEDGER));
        mocks
            .distribution_resolver
            .expect_distribution_account()
            .returning(|_| {
                Ok(DistributionAccount {
                    address: "wallet-1".to_string(),
                    account_type: DistributionAccountType::CircleDbVault,
                })
            });
        let mut handler = MockTransactionHandler::new();
        handler.expect_monitor_processing_started().return_const(());

        let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        let err = worker.run_job(&mut job).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected distribution account to be a STELLAR account but got \"CIRCLE_DB_VAULT\""
        );
    }

    #[tokio::test]
    async fn test_invalid_jobs_are_rejected() {
        let stores = SubmissionStores::in_memory();
        let mut unlocked = TxJob::new(
            channel_account(ACCOUNT_ADDRESS),
            Transaction::new("payment-1", "tenant-1", payment_details()),
        );

        let worker = worker(
            &stores,
            reconciling_engine(),
            MockTransactionHandler::new(),
            producer(0),
            crash_tracker(0),
        );
        let err = worker.run_job(&mut unlocked).await.unwrap_err();
        assert_eq!(err.to_string(), "validating job: transaction should be locked");

        let mut channel_unlocked = unlocked.clone();
        channel_unlocked.transaction.locked_until_ledger_number = Some(CURRENT_LEDGER + 5);
        let err = worker.run_job(&mut channel_unlocked).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "validating job: channel account should be locked"
        );

        let mut finished = channel_unlocked.clone();
        finished.transaction.status = TransactionStatus::Success;
        let err = worker.run_job(&mut finished).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "validating job: invalid transaction status: SUCCESS"
        );
    }

    #[tokio::test]
    async fn test_reconciliation_not_found_marks_for_reprocessing() {
        let stores = SubmissionStores::in_memory();
        let hash = "c".repeat(64);
        let mut job = submitted_job(&stores, &hash).await;

        let mut mocks = reconciling_engine();
        mocks
            .horizon
            .expect_get_transaction()
            .withf(|hash| hash == "c".repeat(64))
            .times(1)
            .returning(|_| Err(not_found()));
        let mut handler = MockTransactionHandler::new();
        handler
            .expect_monitor_reconciliation_success()
            .withf(|_, _, outcome| *outcome == ReconciliationOutcome::MarkedForReprocessing)
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert!(transaction.stellar_transaction_hash.is_none());
        assert!(transaction.xdr_sent.is_none());
        assert!(transaction.status.is_processable());
    }

    #[tokio::test]
    async fn test_reprocessing_keeps_lock_taken_by_next_selection() {
        let stores = SubmissionStores::in_memory();
        let mut job = submitted_job(&stores, &"c".repeat(64)).await;
        let channel_accounts = Arc::new(SelectOnUnlock::new(&stores));

        let mut mocks = reconciling_engine();
        mocks
            .horizon
            .expect_get_transaction()
            .times(1)
            .returning(|_| Err(not_found()));
        let mut handler = MockTransactionHandler::new();
        handler
            .expect_monitor_reconciliation_success()
            .times(1)
            .return_const(());

        let worker = interleaved_worker(&stores, channel_accounts.clone(), mocks, handler);
        worker.run_job(&mut job).await.unwrap();

        let selected = channel_accounts.selected.lock().unwrap().clone();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].transaction.id, job.transaction.id);
        assert!(selected[0].transaction.stellar_transaction_hash.is_none());

        let transaction = stores.transactions.get(&job.transaction.id).await.unwrap();
        assert_eq!(
            transaction.locked_until_ledger_number,
            Some(CURRENT_LEDGER + 10)
        );
        let channel = stores
            .channel_accounts
            .get(&job.channel_account.public_key)
            .await
            .unwrap();
        assert_eq!(channel.locked_until_ledger_number, Some(CURRENT_LEDGER + 10));

        let again = stores
            .jobs
            .load_and_lock_tuples(CURRENT_LEDGER, CURRENT_LEDGER + 10, 1)
            .await;
        assert!(!matches!(again, Ok(jobs) if !jobs.is_empty()));
    }

    #[tokio::test]
    async fn test_reconciliation_is_idempotent() {
        let stores = SubmissionStores::in_memory();
        let hash = "d".repeat(64);
        let mut job = submitted_job(&stores, &hash).await;

        let mut mocks = reconciling_engine();
        mocks
            .horizon
            .expect_get_transaction()
            .times(1)
            .returning(|hash| Ok(success_response(hash)));
        let mut handler = payment_handler();
        handler
            .expect_monitor_reconciliation_success()
            .withf(|_, _, outcome| *outcome == ReconciliationOutcome::Successful)
            .times(1)
            .return_const(());

        let worker = worker(&stores, mocks, handler, producer(1), crash_tracker(0));
        worker.run_job(&mut job).await.unwrap();
        assert_eq!(job.transaction.status, TransactionStatus::Success);

        let err = worker.run_job(&mut job).await.unwrap_err();
        assert!(matches!(err, TransactionError::InvalidJob(_)));

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Success);
        assert_eq!(transaction.stellar_transaction_hash, Some(hash));
    }

    #[tokio::test]
    async fn test_unexpected_reconciliation_leaves_job_locked() {
        let cases = [
            Err(horizon_problem(500, None, &[])),
            Ok(HorizonTransactionResponse {
                successful: false,
                ..success_response(&"e".repeat(64))
            }),
        ];

        for response in cases {
            let stores = SubmissionStores::in_memory();
            let mut job = submitted_job(&stores, &"e".repeat(64)).await;

            let mut mocks = reconciling_engine();
            mocks
                .horizon
                .expect_get_transaction()
                .times(1)
                .returning(move |_| response.clone());
            let mut handler = MockTransactionHandler::new();
            handler
                .expect_monitor_reconciliation_failure()
                .withf(|_, _, horizon_error, _| *horizon_error)
                .times(1)
                .return_const(());

            let worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
            let err = worker.run_job(&mut job).await.unwrap_err();
            assert!(matches!(err, TransactionError::UnexpectedReconciliation(_)));

            let transaction = stores.transactions.get(&job.transaction.id).await.unwrap();
            assert_eq!(transaction.status, TransactionStatus::Processing);
            assert!(transaction.locked_until_ledger_number.is_some());
            assert!(transaction.stellar_transaction_hash.is_some());
        }
    }

    #[tokio::test]
    async fn test_missing_event_producer_does_not_fail_the_job() {
        let stores = SubmissionStores::in_memory();
        let mut job = locked_job(&stores).await;

        let mut mocks = submitting_engine();
        mocks
            .horizon
            .expect_submit_transaction_xdr()
            .returning(|_| Ok(success_response(&"f".repeat(64))));
        let mut handler = payment_handler();
        handler
            .expect_monitor_processing_success()
            .times(1)
            .return_const(());

        let mut worker = worker(&stores, mocks, handler, producer(0), crash_tracker(0));
        worker.context.event_producer = None;
        worker.run_job(&mut job).await.unwrap();

        let transaction = assert_unlocked(&stores, &job).await;
        assert_eq!(transaction.status, TransactionStatus::Success);
    }
}
