use async_trait::async_trait;

use super::ChannelAccountStore;
use crate::{
    models::{ChannelAccount, RepositoryError},
    repositories::SharedState,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryChannelAccountStore {
    state: SharedState,
}

impl InMemoryChannelAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SharedState) -> Self {
        Self { state }
    }

    fn update<F>(&self, public_key: &str, apply: F) -> Result<ChannelAccount, RepositoryError>
    where
        F: FnOnce(&mut ChannelAccount) -> Result<(), RepositoryError>,
    {
        let mut state = self.state.lock();
        let account = state.channel_accounts.get_mut(public_key).ok_or_else(|| {
            RepositoryError::NotFound(format!("channel account {public_key} not found"))
        })?;
        apply(account)?;
        Ok(account.clone())
    }
}

#[async_trait]
impl ChannelAccountStore for InMemoryChannelAccountStore {
    async fn insert(&self, account: ChannelAccount) -> Result<ChannelAccount, RepositoryError> {
        let mut state = self.state.lock();
        if state.channel_accounts.contains_key(&account.public_key) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "channel account {} already exists",
                account.public_key
            )));
        }
        state
            .channel_accounts
            .insert(account.public_key.clone(), account.clone());
        Ok(account)
    }

    async fn get(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError> {
        self.state
            .lock()
            .channel_accounts
            .get(public_key)
            .cloned()
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("channel account {public_key} not found"))
            })
    }

    async fn get_all(&self) -> Result<Vec<ChannelAccount>, RepositoryError> {
        let mut accounts: Vec<ChannelAccount> =
            self.state.lock().channel_accounts.values().cloned().collect();
        accounts.sort_by_key(|account| account.created_at);
        Ok(accounts)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.state.lock().channel_accounts.len())
    }

    async fn delete(&self, public_key: &str) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .channel_accounts
            .remove(public_key)
            .map(|_| ())
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("channel account {public_key} not found"))
            })
    }

    async fn lock(
        &self,
        public_key: &str,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<ChannelAccount, RepositoryError> {
        self.update(public_key, |account| {
            account.apply_lock(current_ledger_number, lock_to_ledger_number)
        })
    }

    async fn unlock(&self, public_key: &str) -> Result<ChannelAccount, RepositoryError> {
        self.update(public_key, |account| {
            account.apply_unlock();
            Ok(())
        })
    }
}
