//! Cached view of the network's latest ledger height.
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;
use tracing::debug;

use super::provider::{HorizonClientTrait, ProviderError};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerNumberTrackerTrait: Send + Sync {
    async fn get_ledger_number(&self) -> Result<u32, ProviderError>;
}

#[derive(Debug, Clone, Copy)]
struct CachedLedger {
    number: u32,
    fetched_at: Instant,
}

pub struct LedgerNumberTracker {
    horizon: Arc<dyn HorizonClientTrait>,
    max_age: Duration,
    cache: RwLock<Option<CachedLedger>>,
}

impl LedgerNumberTracker {
    pub fn new(horizon: Arc<dyn HorizonClientTrait>, max_age: Duration) -> Self {
        Self {
            horizon,
            max_age,
            cache: RwLock::new(None),
        }
    }

    fn fresh(&self, cached: Option<CachedLedger>) -> Option<u32> {
        cached
            .filter(|c| c.fetched_at.elapsed() < self.max_age)
            .map(|c| c.number)
    }
}

#[async_trait]
impl LedgerNumberTrackerTrait for LedgerNumberTracker {
    async fn get_ledger_number(&self) -> Result<u32, ProviderError> {
        if let Some(number) = self.fresh(*self.cache.read().await) {
            return Ok(number);
        }

        let mut cache = self.cache.write().await;
        // another caller may have refreshed while we waited for the write lock
        if let Some(number) = self.fresh(*cache) {
            return Ok(number);
        }

        let number = self.horizon.get_latest_ledger().await?;
        debug!(ledger_number = number, "refreshed ledger number");
        *cache = Some(CachedLedger {
            number,
            fetched_at: Instant::now(),
        });
        Ok(number)
    }
}
