//! Channel Account Store
mod channel_account_in_memory;
mod channel_account_redis;

pub use channel_account_in_memory::*;
pub use channel_account_redis::*;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::models::{ChannelAccount, RepositoryError};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelAccountStore: Send + Sync {
    async fn insert(&self, account: ChannelAccount) -> Result<ChannelAccount, RepositoryError>;

    async fn get(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError>;

    async fn get_all(&self) -> Result<Vec<ChannelAccount>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    async fn delete(&self, public_key: &str) -> Result<(), RepositoryError>;

    /// Locks an unlocked account until `lock_to_ledger_number`.
    async fn lock(
        &self,
        public_key: &str,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<ChannelAccount, RepositoryError>;

    async fn unlock(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError>;
}

impl ChannelAccount {
    pub(crate) fn apply_lock(
        &mut self,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<(), RepositoryError> {
        if self.is_locked(current_ledger_number) {
            return Err(RepositoryError::NotFound(format!(
                "channel account {} cannot be locked",
                self.public_key
            )));
        }
        let now = chrono::Utc::now();
        self.locked_at = Some(now);
        self.locked_until_ledger_number = Some(lock_to_ledger_number);
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn apply_unlock(&mut self) {
        self.locked_at = None;
        self.locked_until_ledger_number = None;
        self.updated_at = chrono::Utc::now();
    }
}
