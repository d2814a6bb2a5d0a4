//! Job selection: atomically pairs unlocked transactions with unlocked channel accounts.
mod tx_job_in_memory;
mod tx_job_redis;

pub use tx_job_in_memory::*;
pub use tx_job_redis::*;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::models::{ChannelAccount, RepositoryError, Transaction, TxJob};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Locks up to `limit` `(channel account, transaction)` pairs until `lock_to_ledger_number`.
    ///
    /// Returns an empty list when there is no work and
    /// [`RepositoryError::InsufficientChannelAccounts`] when there is work but
    /// every channel account is locked.
    async fn load_and_lock_tuples(
        &self,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
        limit: i32,
    ) -> Result<Vec<TxJob>, RepositoryError>;
}

/// Pairs and locks candidates in memory. Callers persist the returned rows.
pub(crate) fn select_and_lock(
    transactions: Vec<Transaction>,
    channel_accounts: Vec<ChannelAccount>,
    current_ledger_number: u32,
    lock_to_ledger_number: u32,
    limit: i32,
) -> Result<Vec<TxJob>, RepositoryError> {
    if limit < 1 {
        return Err(RepositoryError::InvalidData(
            "limit must be greater than 0".to_string(),
        ));
    }
    if lock_to_ledger_number <= current_ledger_number {
        return Err(RepositoryError::InvalidData(format!(
            "lock ledger {lock_to_ledger_number} must be greater than current ledger {current_ledger_number}"
        )));
    }

    let mut transactions: Vec<Transaction> = transactions
        .into_iter()
        .filter(|tx| tx.is_lockable(current_ledger_number))
        .collect();
    transactions.sort_by_key(|tx| tx.updated_at);
    transactions.truncate(limit as usize);
    if transactions.is_empty() {
        return Ok(Vec::new());
    }

    let mut channel_accounts: Vec<ChannelAccount> = channel_accounts
        .into_iter()
        .filter(|account| !account.is_locked(current_ledger_number))
        .collect();
    channel_accounts.sort_by_key(|account| account.updated_at);
    channel_accounts.truncate(transactions.len());
    if channel_accounts.is_empty() {
        return Err(RepositoryError::InsufficientChannelAccounts);
    }

    channel_accounts
        .into_iter()
        .zip(transactions)
        .map(|(mut account, mut tx)| {
            account.apply_lock(current_ledger_number, lock_to_ledger_number)?;
            tx.lock(current_ledger_number, lock_to_ledger_number)?;
            Ok(TxJob {
                channel_account: account,
                transaction: tx,
                locked_until_ledger_number: lock_to_ledger_number,
            })
        })
        .collect()
}
