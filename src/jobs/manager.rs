use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::watch,
    task::{JoinError, JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

use crate::{
    constants::{INCREMENT_FOR_MAX_LEDGER_BOUNDS, MAX_NUM_CHANNEL_ACCOUNTS, MIN_QUEUE_POLLING_INTERVAL},
    domain::{EngineError, HandlerSet, SubmitterEngine, TransactionWorker, WorkerContext},
    models::{RepositoryError, TxJob},
    repositories::SubmissionStores,
    services::{
        provider::ProviderError, CrashTracker, EventProducer, TransactionObserver,
        TransactionProcessingLimiter,
    },
};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("num channel accounts must be between 1 and {MAX_NUM_CHANNEL_ACCOUNTS}, got {0}")]
    InvalidNumChannelAccounts(usize),
    #[error("queue polling interval must be at least {}s, got {}s", MIN_QUEUE_POLLING_INTERVAL.as_secs(), .0.as_secs())]
    InvalidPollingInterval(Duration),
    #[error("validating submitter engine: {0}")]
    Engine(#[from] EngineError),
    #[error("no channel accounts found in the store, provision channel accounts before starting the submitter")]
    NoChannelAccounts,
    #[error("getting current ledger number: {0}")]
    LedgerNumber(ProviderError),
    #[error("loading jobs: {0}")]
    Repository(#[from] RepositoryError),
}

/// Everything the manager needs to run workers.
pub struct ManagerOptions {
    pub num_channel_accounts: usize,
    pub queue_polling_interval: Duration,
    pub engine: SubmitterEngine,
    pub stores: SubmissionStores,
    pub observer: Arc<dyn TransactionObserver>,
    pub crash_tracker: Arc<dyn CrashTracker>,
    pub event_producer: Option<Arc<dyn EventProducer>>,
}

impl ManagerOptions {
    fn validate(&self) -> Result<(), ManagerError> {
        if self.num_channel_accounts == 0 || self.num_channel_accounts > MAX_NUM_CHANNEL_ACCOUNTS {
            return Err(ManagerError::InvalidNumChannelAccounts(
                self.num_channel_accounts,
            ));
        }
        if self.queue_polling_interval < MIN_QUEUE_POLLING_INTERVAL {
            return Err(ManagerError::InvalidPollingInterval(
                self.queue_polling_interval,
            ));
        }
        self.engine.validate()?;
        Ok(())
    }
}

pub struct Manager {
    polling_interval: Duration,
    stores: SubmissionStores,
    handlers: HandlerSet,
    worker_context: WorkerContext,
}

impl Manager {
    /// Validates the options and checks channel accounts are provisioned.
    pub async fn new(options: ManagerOptions) -> Result<Self, ManagerError> {
        options.validate()?;

        let channel_accounts = options.stores.channel_accounts.count().await?;
        if channel_accounts == 0 {
            return Err(ManagerError::NoChannelAccounts);
        }
        info!(channel_accounts, "found channel accounts in the store");
        if options.num_channel_accounts > channel_accounts {
            warn!(
                found = channel_accounts,
                expected = options.num_channel_accounts,
                "the number of channel accounts in the store is smaller than expected"
            );
        }

        let engine = Arc::new(options.engine);
        let limit = i32::try_from(options.num_channel_accounts)
            .map_err(|_| ManagerError::InvalidNumChannelAccounts(options.num_channel_accounts))?;

        Ok(Self {
            polling_interval: options.queue_polling_interval,
            handlers: HandlerSet::new(engine.clone(), options.observer),
            worker_context: WorkerContext {
                engine,
                transactions: options.stores.transactions.clone(),
                channel_accounts: options.stores.channel_accounts.clone(),
                limiter: Arc::new(TransactionProcessingLimiter::new(limit)),
                crash_tracker: options.crash_tracker,
                event_producer: options.event_producer,
            },
            stores: options.stores,
        })
    }

    /// Runs the scheduler until `shutdown` flips to `true` or its sender is
    /// dropped, then waits for in-flight workers.
    pub async fn process_transactions(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            polling_interval_seconds = self.polling_interval.as_secs(),
            "starting transaction submission service"
        );

        let mut ticker = tokio::time::interval(self.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("stopping transaction submission service");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    while let Some(result) = workers.try_join_next() {
                        self.handle_worker_exit(result);
                    }
                    let dispatched = self.dispatch_ready_jobs(&mut workers).await;
                    debug!(dispatched, in_flight = workers.len(), "scheduler pass completed");
                }
            }
        }

        if !workers.is_empty() {
            info!(in_flight = workers.len(), "waiting for in-flight workers");
        }
        while let Some(result) = workers.join_next().await {
            self.handle_worker_exit(result);
        }
    }

    /// Workers handle their own errors, so only panics and cancellations
    /// surface here. A panicked worker leaves its locks to expire.
    pub fn handle_worker_exit(&self, result: Result<(), JoinError>) {
        match result {
            Ok(()) => {}
            Err(error) if error.is_panic() => {
                self.worker_context
                    .crash_tracker
                    .log_and_report_errors(&error.to_string(), "transaction worker panicked");
            }
            Err(error) => error!(error = %error, "transaction worker was cancelled"),
        }
    }

    /// Locks a batch of ready jobs and spawns one worker per job. Returns the
    /// number of workers spawned.
    pub async fn dispatch_ready_jobs(&self, workers: &mut JoinSet<()>) -> usize {
        debug!("loading transactions from the store");
        let jobs = match self.load_ready_for_processing_jobs().await {
            Ok(jobs) => jobs,
            Err(ManagerError::Repository(RepositoryError::InsufficientChannelAccounts)) => {
                warn!(
                    "attempting to load transactions from the store: {}",
                    RepositoryError::InsufficientChannelAccounts
                );
                return 0;
            }
            Err(error) => {
                self.worker_context.crash_tracker.log_and_report_errors(
                    &error.to_string(),
                    "attempting to load transactions from the store",
                );
                return 0;
            }
        };

        debug!(jobs = jobs.len(), "loaded transactions from the store");
        let dispatched = jobs.len();
        for job in jobs {
            let handler = self
                .handlers
                .handler_for(job.transaction.transaction_type());
            let worker = TransactionWorker::new(self.worker_context.clone(), handler);
            workers.spawn(async move { worker.run(job).await });
        }
        dispatched
    }

    async fn load_ready_for_processing_jobs(&self) -> Result<Vec<TxJob>, ManagerError> {
        let current_ledger_number = self
            .worker_context
            .engine
            .ledger_number_tracker
            .get_ledger_number()
            .await
            .map_err(ManagerError::LedgerNumber)?;
        let lock_to_ledger_number = current_ledger_number + INCREMENT_FOR_MAX_LEDGER_BOUNDS;

        Ok(self
            .stores
            .jobs
            .load_and_lock_tuples(
                current_ledger_number,
                lock_to_ledger_number,
                self.worker_context.limiter.limit_value(),
            )
            .await?)
    }
}

/// Flips `shutdown` to `true` on SIGINT or SIGTERM.
pub fn spawn_shutdown_signal_handler(shutdown: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(error), _) | (_, Err(error)) => {
                error!(error = %error, "failed to install shutdown signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
        let _ = shutdown.send(true);
    })
}
