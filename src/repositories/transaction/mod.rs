//! Transaction Store
mod transaction_in_memory;
mod transaction_redis;

pub use transaction_in_memory::*;
pub use transaction_redis::*;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::models::{RepositoryError, Transaction, TransactionType};

/// Durable transaction rows. Every update touches a single row.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Validates and inserts a new row.
    async fn insert(&self, transaction: Transaction) -> Result<Transaction, RepositoryError>;

    async fn bulk_insert(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Transaction, RepositoryError>;

    /// All rows, retries included, of the given business entities.
    async fn get_all_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<Vec<Transaction>, RepositoryError>;

    async fn update_status_to_success(&self, id: &str) -> Result<Transaction, RepositoryError>;

    async fn update_status_to_error(
        &self,
        id: &str,
        message: &str,
    ) -> Result<Transaction, RepositoryError>;

    async fn update_stellar_transaction_hash_and_xdr_sent(
        &self,
        id: &str,
        hash: &str,
        xdr_sent: &str,
        distribution_account: &str,
    ) -> Result<Transaction, RepositoryError>;

    async fn update_stellar_transaction_xdr_received(
        &self,
        id: &str,
        xdr_received: &str,
    ) -> Result<Transaction, RepositoryError>;

    async fn prepare_transaction_for_reprocessing(
        &self,
        id: &str,
    ) -> Result<Transaction, RepositoryError>;

    async fn lock(
        &self,
        id: &str,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<Transaction, RepositoryError>;

    async fn unlock(&self, id: &str) -> Result<Transaction, RepositoryError>;

    /// Terminal rows of a tenant not yet acknowledged downstream, oldest completion first.
    async fn get_transaction_batch_for_sync(
        &self,
        batch_size: usize,
        tenant_id: &str,
        transaction_type: TransactionType,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    /// Stamps `synced_at`; fails unless every id is a terminal row.
    async fn update_synced_transactions(
        &self,
        ids: &[String],
    ) -> Result<Vec<Transaction>, RepositoryError>;
}

/// Selection rule shared by the sync query of every backend.
pub(crate) fn sync_batch(
    mut candidates: Vec<Transaction>,
    batch_size: usize,
    tenant_id: &str,
    transaction_type: TransactionType,
) -> Vec<Transaction> {
    candidates.retain(|tx| {
        tx.status.is_terminal()
            && tx.synced_at.is_none()
            && tx.tenant_id == tenant_id
            && tx.transaction_type() == transaction_type
    });
    candidates.sort_by_key(|tx| tx.completed_at);
    candidates.truncate(batch_size);
    candidates
}
