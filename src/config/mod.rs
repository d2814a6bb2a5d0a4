//! Submitter configuration loaded from environment variables.
//!
//! Every variable is read once at startup. Validation failures name the
//! offending variable so a misconfigured deployment fails fast.
use std::{env, str::FromStr, time::Duration};

use strum::{Display, EnumString};
use thiserror::Error;

use crate::{
    constants::{
        DEFAULT_LEDGER_NUMBER_MAX_AGE, DEFAULT_PROVIDER_TIMEOUT_SECONDS, DEFAULT_REDIS_KEY_PREFIX,
        DEFAULT_REDIS_URL, MAX_NUM_CHANNEL_ACCOUNTS, MIN_BASE_FEE, MIN_QUEUE_POLLING_INTERVAL,
        PUBLIC_NETWORK_PASSPHRASE, TEST_NETWORK_PASSPHRASE,
    },
    utils::FieldEncryption,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum StorageType {
    InMemory,
    Redis,
}

#[derive(Clone)]
pub struct SubmitterConfig {
    pub horizon_url: String,
    pub rpc_url: Option<String>,
    pub network_passphrase: String,
    pub distribution_seed: String,
    pub channel_account_encryption_key: String,
    pub num_channel_accounts: usize,
    pub queue_polling_interval: Duration,
    pub max_base_fee: u32,
    pub storage_type: StorageType,
    pub redis_url: String,
    pub redis_key_prefix: String,
    pub event_stream_enabled: bool,
    pub ledger_number_max_age: Duration,
    pub provider_timeout_seconds: u64,
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for SubmitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitterConfig")
            .field("horizon_url", &self.horizon_url)
            .field("rpc_url", &self.rpc_url)
            .field("network_passphrase", &self.network_passphrase)
            .field("num_channel_accounts", &self.num_channel_accounts)
            .field("queue_polling_interval", &self.queue_polling_interval)
            .field("max_base_fee", &self.max_base_fee)
            .field("storage_type", &self.storage_type)
            .field("redis_key_prefix", &self.redis_key_prefix)
            .field("event_stream_enabled", &self.event_stream_enabled)
            .finish_non_exhaustive()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, format!("{value:?}: {e}"))),
        None => Ok(default),
    }
}

impl SubmitterConfig {
    /// Reads the configuration, loading a `.env` file first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            horizon_url: required("HORIZON_URL")?,
            rpc_url: optional("RPC_URL"),
            network_passphrase: required("NETWORK_PASSPHRASE")?,
            distribution_seed: required("DISTRIBUTION_SEED")?,
            channel_account_encryption_key: required("CHANNEL_ACCOUNT_ENCRYPTION_KEY")?,
            num_channel_accounts: parsed("NUM_CHANNEL_ACCOUNTS", 1)?,
            queue_polling_interval: Duration::from_secs(parsed(
                "QUEUE_POLLING_INTERVAL",
                MIN_QUEUE_POLLING_INTERVAL.as_secs(),
            )?),
            max_base_fee: parsed("MAX_BASE_FEE", MIN_BASE_FEE)?,
            storage_type: parsed("STORAGE_TYPE", StorageType::InMemory)?,
            redis_url: optional("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            redis_key_prefix: optional("REDIS_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_string()),
            event_stream_enabled: parsed("EVENT_STREAM_ENABLED", false)?,
            ledger_number_max_age: Duration::from_secs(parsed(
                "LEDGER_NUMBER_MAX_AGE_SECONDS",
                DEFAULT_LEDGER_NUMBER_MAX_AGE.as_secs(),
            )?),
            provider_timeout_seconds: parsed(
                "PROVIDER_TIMEOUT_SECONDS",
                DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            )?,
            metrics_enabled: parsed("METRICS_ENABLED", false)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.horizon_url.starts_with("http://") && !self.horizon_url.starts_with("https://") {
            return Err(ConfigError::invalid(
                "HORIZON_URL",
                "must be an http(s) URL",
            ));
        }
        if self.network_passphrase != PUBLIC_NETWORK_PASSPHRASE
            && self.network_passphrase != TEST_NETWORK_PASSPHRASE
        {
            return Err(ConfigError::invalid(
                "NETWORK_PASSPHRASE",
                "must be the public or test network passphrase",
            ));
        }
        if stellar_strkey::ed25519::PrivateKey::from_string(&self.distribution_seed).is_err() {
            return Err(ConfigError::invalid(
                "DISTRIBUTION_SEED",
                "must be a Stellar secret seed",
            ));
        }
        FieldEncryption::from_base64_key(&self.channel_account_encryption_key)
            .map_err(|e| ConfigError::invalid("CHANNEL_ACCOUNT_ENCRYPTION_KEY", e.to_string()))?;
        if self.num_channel_accounts == 0 || self.num_channel_accounts > MAX_NUM_CHANNEL_ACCOUNTS {
            return Err(ConfigError::invalid(
                "NUM_CHANNEL_ACCOUNTS",
                format!("must be between 1 and {MAX_NUM_CHANNEL_ACCOUNTS}"),
            ));
        }
        if self.queue_polling_interval < MIN_QUEUE_POLLING_INTERVAL {
            return Err(ConfigError::invalid(
                "QUEUE_POLLING_INTERVAL",
                format!("must be at least {}", MIN_QUEUE_POLLING_INTERVAL.as_secs()),
            ));
        }
        if self.max_base_fee < MIN_BASE_FEE {
            return Err(ConfigError::invalid(
                "MAX_BASE_FEE",
                format!("must be at least {MIN_BASE_FEE}"),
            ));
        }
        if self.storage_type == StorageType::Redis && self.redis_key_prefix.is_empty() {
            return Err(ConfigError::invalid("REDIS_KEY_PREFIX", "cannot be empty"));
        }
        Ok(())
    }
}
