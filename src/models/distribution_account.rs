use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DistributionAccountPlatform {
    Stellar,
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionAccountType {
    /// Seed supplied through the environment.
    StellarEnv,
    /// Seed stored encrypted alongside channel accounts.
    StellarDbVault,
    CircleDbVault,
}

impl DistributionAccountType {
    pub fn platform(&self) -> DistributionAccountPlatform {
        match self {
            DistributionAccountType::StellarEnv | DistributionAccountType::StellarDbVault => {
                DistributionAccountPlatform::Stellar
            }
            DistributionAccountType::CircleDbVault => DistributionAccountPlatform::Circle,
        }
    }
}

/// Account paying for a tenant's transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionAccount {
    /// Stellar address, or the platform's wallet id for non-ledger accounts.
    pub address: String,
    pub account_type: DistributionAccountType,
}

impl DistributionAccount {
    pub fn stellar_env(address: &str) -> Self {
        Self {
            address: address.to_string(),
            account_type: DistributionAccountType::StellarEnv,
        }
    }

    pub fn is_stellar(&self) -> bool {
        self.account_type.platform() == DistributionAccountPlatform::Stellar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_of_each_type() {
        assert!(DistributionAccount::stellar_env("GABC").is_stellar());
        let circle = DistributionAccount {
            address: "wallet-1".to_string(),
            account_type: DistributionAccountType::CircleDbVault,
        };
        assert!(!circle.is_stellar());
        assert_eq!(circle.account_type.to_string(), "CIRCLE_DB_VAULT");
    }
}
