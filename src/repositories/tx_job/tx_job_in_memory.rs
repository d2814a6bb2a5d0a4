use async_trait::async_trait;

use super::{select_and_lock, JobStore};
use crate::{
    models::{RepositoryError, TxJob},
    repositories::SharedState,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    state: SharedState,
}

impl InMemoryJobStore {
    pub fn with_state(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn load_and_lock_tuples(
        &self,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
        limit: i32,
    ) -> Result<Vec<TxJob>, RepositoryError> {
        // selection and write-back happen under one guard
        let mut state = self.state.lock();
        let jobs = select_and_lock(
            state.transactions.values().cloned().collect(),
            state.channel_accounts.values().cloned().collect(),
            current_ledger_number,
            lock_to_ledger_number,
            limit,
        )?;

        for job in &jobs {
            state
                .transactions
                .insert(job.transaction.id.clone(), job.transaction.clone());
            state.channel_accounts.insert(
                job.channel_account.public_key.clone(),
                job.channel_account.clone(),
            );
        }
        Ok(jobs)
    }
}
