//! # Repository Module
//!
//! Persistence for transactions and channel accounts. Two backends are
//! provided: an in-memory one, where the three stores share a single mutex,
//! and a Redis one storing JSON documents.
use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::models::{ChannelAccount, RepositoryError, Transaction};

mod transaction;
pub use transaction::*;

mod channel_account;
pub use channel_account::*;

mod tx_job;
pub use tx_job::*;

pub mod redis_base;

#[derive(Debug, Default)]
pub struct InMemoryState {
    pub(crate) transactions: HashMap<String, Transaction>,
    pub(crate) channel_accounts: HashMap<String, ChannelAccount>,
}

/// State shared by the in-memory stores so job selection can lock both sides at once.
pub type SharedState = Arc<Mutex<InMemoryState>>;

/// The stores a submission service runs against.
#[derive(Clone)]
pub struct SubmissionStores {
    pub transactions: Arc<dyn TransactionStore>,
    pub channel_accounts: Arc<dyn ChannelAccountStore>,
    pub jobs: Arc<dyn JobStore>,
}

impl SubmissionStores {
    pub fn in_memory() -> Self {
        let state = SharedState::default();
        Self {
            transactions: Arc::new(InMemoryTransactionStore::with_state(state.clone())),
            channel_accounts: Arc::new(InMemoryChannelAccountStore::with_state(state.clone())),
            jobs: Arc::new(InMemoryJobStore::with_state(state)),
        }
    }

    pub async fn redis(redis_url: &str, key_prefix: &str) -> Result<Self, RepositoryError> {
        let connection_manager = redis_base::initialize_redis_connection(redis_url).await?;
        Ok(Self {
            transactions: Arc::new(RedisTransactionStore::new(
                connection_manager.clone(),
                key_prefix.to_string(),
            )?),
            channel_accounts: Arc::new(RedisChannelAccountStore::new(
                connection_manager.clone(),
                key_prefix.to_string(),
            )?),
            jobs: Arc::new(RedisJobStore::new(
                connection_manager,
                key_prefix.to_string(),
            )?),
        })
    }
}
