//! Redis-backed transaction store.
//!
//! Rows are JSON documents under `<prefix>:transaction:<id>`, indexed by the
//! `<prefix>:transaction_list` set and by per-external-id sets. Ids of rows
//! in a processable status are also kept in `<prefix>:transaction_processable`,
//! written in the same pipeline as the row, so job selection never scans
//! finished rows.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::debug;

use super::{sync_batch, TransactionStore};
use crate::{
    models::{RepositoryError, Transaction, TransactionType},
    repositories::redis_base::{validate_key_prefix, RedisRepository},
};

const TRANSACTION_PREFIX: &str = "transaction";
const TRANSACTION_LIST_KEY: &str = "transaction_list";
const EXTERNAL_ID_PREFIX: &str = "transaction_external";
const PROCESSABLE_KEY: &str = "transaction_processable";

#[derive(Clone)]
pub struct RedisTransactionStore {
    pub client: Arc<ConnectionManager>,
    pub key_prefix: String,
}

impl RedisRepository for RedisTransactionStore {}

impl fmt::Debug for RedisTransactionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTransactionStore")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisTransactionStore {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        key_prefix: String,
    ) -> Result<Self, RepositoryError> {
        validate_key_prefix(&key_prefix)?;
        Ok(Self {
            client: connection_manager,
            key_prefix,
        })
    }

    fn transaction_key(&self, id: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, TRANSACTION_PREFIX, id)
    }

    fn transaction_list_key(&self) -> String {
        format!("{}:{}", self.key_prefix, TRANSACTION_LIST_KEY)
    }

    fn processable_key(&self) -> String {
        format!("{}:{}", self.key_prefix, PROCESSABLE_KEY)
    }

    fn index_status(&self, pipe: &mut redis::Pipeline, tx: &Transaction) {
        if tx.status.is_processable() {
            pipe.sadd(self.processable_key(), &tx.id).ignore();
        } else {
            pipe.srem(self.processable_key(), &tx.id).ignore();
        }
    }

    fn external_id_key(&self, external_id: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, EXTERNAL_ID_PREFIX, external_id)
    }

    pub(crate) async fn fetch(&self, id: &str) -> Result<Transaction, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let json: Option<String> = conn
            .get(self.transaction_key(id))
            .await
            .map_err(|e| self.map_redis_error(e, "get_transaction"))?;

        match json {
            Some(json) => self.deserialize_entity(&json, id, "transaction"),
            None => Err(RepositoryError::NotFound(format!(
                "transaction {id} not found"
            ))),
        }
    }

    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Transaction>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.transaction_key(id)).collect();
        let mut conn = self.client.as_ref().clone();
        let values: Vec<Option<String>> = conn
            .mget(&keys)
            .await
            .map_err(|e| self.map_redis_error(e, "mget_transactions"))?;

        let mut transactions = Vec::with_capacity(values.len());
        for (id, json) in ids.iter().zip(values) {
            match json {
                Some(json) => transactions.push(self.deserialize_entity(&json, id, "transaction")?),
                None => debug!(tx_id = %id, "indexed transaction missing, skipping"),
            }
        }
        Ok(transactions)
    }

    pub(crate) async fn fetch_all(&self) -> Result<Vec<Transaction>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let ids: Vec<String> = conn
            .smembers(self.transaction_list_key())
            .await
            .map_err(|e| self.map_redis_error(e, "list_transactions"))?;
        self.fetch_many(&ids).await
    }

    /// Rows indexed as processable. The status is re-checked since the
    /// index is only as fresh as the last write.
    pub(crate) async fn fetch_processable(&self) -> Result<Vec<Transaction>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let ids: Vec<String> = conn
            .smembers(self.processable_key())
            .await
            .map_err(|e| self.map_redis_error(e, "list_processable_transactions"))?;
        let mut transactions = self.fetch_many(&ids).await?;
        transactions.retain(|tx| tx.status.is_processable());
        Ok(transactions)
    }

    /// Overwrites rows and their status index entries in one atomic pipeline.
    pub(crate) async fn store_all(&self, transactions: &[Transaction]) -> Result<(), RepositoryError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for tx in transactions {
            let json = self.serialize_entity(tx, &tx.id, "transaction")?;
            pipe.set(self.transaction_key(&tx.id), json).ignore();
            self.index_status(&mut pipe, tx);
        }

        let mut conn = self.client.as_ref().clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "store_transactions"))
    }

    async fn update<F>(&self, id: &str, apply: F) -> Result<Transaction, RepositoryError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), RepositoryError> + Send,
    {
        let mut tx = self.fetch(id).await?;
        apply(&mut tx)?;
        self.store_all(std::slice::from_ref(&tx)).await?;
        Ok(tx)
    }

    async fn insert_all(&self, transactions: &[Transaction]) -> Result<(), RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        for tx in transactions {
            let exists: bool = conn
                .exists(self.transaction_key(&tx.id))
                .await
                .map_err(|e| self.map_redis_error(e, "insert_transaction_exists"))?;
            if exists {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "transaction {} already exists",
                    tx.id
                )));
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for tx in transactions {
            let json = self.serialize_entity(tx, &tx.id, "transaction")?;
            pipe.set(self.transaction_key(&tx.id), json).ignore();
            pipe.sadd(self.transaction_list_key(), &tx.id).ignore();
            pipe.sadd(self.external_id_key(&tx.external_id), &tx.id)
                .ignore();
            self.index_status(&mut pipe, tx);
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.map_redis_error(e, "insert_transactions"))
    }
}

#[async_trait]
impl TransactionStore for RedisTransactionStore {
    async fn insert(&self, transaction: Transaction) -> Result<Transaction, RepositoryError> {
        transaction
            .validate()
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
        self.insert_all(std::slice::from_ref(&transaction)).await?;
        debug!(tx_id = %transaction.id, "transaction inserted");
        Ok(transaction)
    }

    async fn bulk_insert(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        for tx in &transactions {
            tx.validate()
                .map_err(|e| RepositoryError::InvalidData(format!("{}: {e}", tx.external_id)))?;
        }
        self.insert_all(&transactions).await?;
        Ok(transactions)
    }

    async fn get(&self, id: &str) -> Result<Transaction, RepositoryError> {
        self.fetch(id).await
    }

    async fn get_all_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut conn = self.client.as_ref().clone();
        let mut ids = Vec::new();
        for external_id in external_ids {
            let members: Vec<String> = conn
                .smembers(self.external_id_key(external_id))
                .await
                .map_err(|e| self.map_redis_error(e, "get_by_external_id"))?;
            ids.extend(members);
        }

        let mut transactions = self.fetch_many(&ids).await?;
        transactions.sort_by_key(|tx| tx.created_at);
        Ok(transactions)
    }

    async fn update_status_to_success(&self, id: &str) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.mark_success()).await
    }

    async fn update_status_to_error(
        &self,
        id: &str,
        message: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.mark_error(message)).await
    }

    async fn update_stellar_transaction_hash_and_xdr_sent(
        &self,
        id: &str,
        hash: &str,
        xdr_sent: &str,
        distribution_account: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| {
            tx.record_submission(hash, xdr_sent, distribution_account)
        })
        .await
    }

    async fn update_stellar_transaction_xdr_received(
        &self,
        id: &str,
        xdr_received: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.record_xdr_received(xdr_received))
            .await
    }

    async fn prepare_transaction_for_reprocessing(
        &self,
        id: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.prepare_for_reprocessing()).await
    }

    async fn lock(
        &self,
        id: &str,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.lock(current_ledger_number, lock_to_ledger_number))
            .await
    }

    async fn unlock(&self, id: &str) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| {
            tx.unlock();
            Ok(())
        })
        .await
    }

    async fn get_transaction_batch_for_sync(
        &self,
        batch_size: usize,
        tenant_id: &str,
        transaction_type: TransactionType,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let candidates = self.fetch_all().await?;
        Ok(sync_batch(candidates, batch_size, tenant_id, transaction_type))
    }

    async fn update_synced_transactions(
        &self,
        ids: &[String],
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut synced = self.fetch_many(ids).await?;
        if synced.len() != ids.len() {
            return Err(RepositoryError::NotFound(format!(
                "expected {} transactions to sync, found {}",
                ids.len(),
                synced.len()
            )));
        }
        for tx in synced.iter_mut() {
            tx.mark_synced()?;
        }
        self.store_all(&synced).await?;
        Ok(synced)
    }
}
