//! Maps tenants to the account that funds their transactions.
use std::collections::HashMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::DistributionAccount;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DistributionAccountError {
    #[error("distribution account not found for tenant {0}")]
    NotFound(String),
    #[error("tenant id is required")]
    MissingTenant,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DistributionAccountResolver: Send + Sync {
    async fn distribution_account(
        &self,
        tenant_id: &str,
    ) -> Result<DistributionAccount, DistributionAccountError>;

    /// Account used when a tenant has no dedicated distribution account.
    fn host_distribution_account(&self) -> DistributionAccount;
}

/// Resolver backed by a fixed tenant map that falls back to the host account.
#[derive(Debug, Clone)]
pub struct StaticDistributionAccountResolver {
    host: DistributionAccount,
    tenants: HashMap<String, DistributionAccount>,
}

impl StaticDistributionAccountResolver {
    pub fn new(host: DistributionAccount) -> Self {
        Self {
            host,
            tenants: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: &str, account: DistributionAccount) -> Self {
        self.tenants.insert(tenant_id.to_string(), account);
        self
    }
}

#[async_trait]
impl DistributionAccountResolver for StaticDistributionAccountResolver {
    async fn distribution_account(
        &self,
        tenant_id: &str,
    ) -> Result<DistributionAccount, DistributionAccountError> {
        if tenant_id.is_empty() {
            return Err(DistributionAccountError::MissingTenant);
        }
        Ok(self
            .tenants
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| self.host.clone()))
    }

    fn host_distribution_account(&self) -> DistributionAccount {
        self.host.clone()
    }
}
