//! Redis job selection, serialized across processes by a distributed lock.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use super::{select_and_lock, JobStore};
use crate::{
    models::{RepositoryError, TxJob},
    repositories::{
        redis_base::{map_redis_error, validate_key_prefix},
        ChannelAccountStore, RedisChannelAccountStore, RedisTransactionStore,
    },
    utils::DistributedLock,
};

const SELECTION_LOCK_KEY: &str = "lock:job_selection";
const SELECTION_LOCK_TTL: Duration = Duration::from_secs(10);
const SELECTION_LOCK_WAIT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RedisJobStore {
    transactions: RedisTransactionStore,
    channel_accounts: RedisChannelAccountStore,
    selection_lock: DistributedLock,
}

impl RedisJobStore {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        validate_key_prefix(&key_prefix)?;
        let selection_lock = DistributedLock::new(
            connection_manager.as_ref().clone(),
            &format!("{key_prefix}:{SELECTION_LOCK_KEY}"),
            SELECTION_LOCK_TTL,
        );
        Ok(Self {
            transactions: RedisTransactionStore::new(connection_manager.clone(), key_prefix.clone())?,
            channel_accounts: RedisChannelAccountStore::new(connection_manager, key_prefix)?,
            selection_lock,
        })
    }

    async fn select(
        &self,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
        limit: i32,
    ) -> Result<Vec<TxJob>, RepositoryError> {
        let transactions = self.transactions.fetch_processable().await?;
        let channel_accounts = self.channel_accounts.get_all().await?;

        let jobs = select_and_lock(
            transactions,
            channel_accounts,
            current_ledger_number,
            lock_to_ledger_number,
            limit,
        )?;
        if jobs.is_empty() {
            return Ok(jobs);
        }

        let accounts: Vec<_> = jobs.iter().map(|job| job.channel_account.clone()).collect();
        let txs: Vec<_> = jobs.iter().map(|job| job.transaction.clone()).collect();
        self.channel_accounts.store_all(&accounts).await?;
        self.transactions.store_all(&txs).await?;
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn load_and_lock_tuples(
        &self,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
        limit: i32,
    ) -> Result<Vec<TxJob>, RepositoryError> {
        let guard = self
            .selection_lock
            .acquire(SELECTION_LOCK_WAIT)
            .await
            .map_err(|e| map_redis_error(e, "acquire_job_selection_lock"))?;
        let Some(guard) = guard else {
            debug!("job selection lock held by another instance, skipping pass");
            return Ok(Vec::new());
        };

        let result = self
            .select(current_ledger_number, lock_to_ledger_number, limit)
            .await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "failed to release job selection lock, it will expire");
        }
        result
    }
}
