//! Initialization routines for the submission service
//!
//! Builds the stores, the submitter engine and the manager from a
//! [`SubmitterConfig`]. No network round trip happens here; the manager
//! checks channel accounts when it is created.
use std::sync::Arc;

use color_eyre::Result;
use eyre::WrapErr;
use tracing::info;

use crate::{
    config::{StorageType, SubmitterConfig},
    domain::SubmitterEngine,
    jobs::{Manager, ManagerOptions},
    models::{DistributionAccount, DistributionAccountType},
    repositories::{redis_base::initialize_redis_connection, SubmissionStores},
    services::{
        ChannelAccountDbSigner, DistributionAccountEnvSigner, EventProducer, HorizonClient,
        LedgerNumberTracker, LoggingCrashTracker, LoggingEventProducer,
        MetricsTransactionObserver, RedisStreamProducer, SorobanRpcClient, SorobanRpcTrait,
        StaticDistributionAccountResolver,
    },
    utils::FieldEncryption,
};

/// Initializes the stores selected by `STORAGE_TYPE`.
pub async fn initialize_stores(config: &SubmitterConfig) -> Result<SubmissionStores> {
    let stores = match config.storage_type {
        StorageType::InMemory => SubmissionStores::in_memory(),
        StorageType::Redis => {
            SubmissionStores::redis(&config.redis_url, &config.redis_key_prefix)
                .await
                .wrap_err("connecting to the redis store")?
        }
    };
    info!(storage_type = %config.storage_type, "stores initialized");
    Ok(stores)
}

/// Builds the engine: providers, signers and the distribution account resolver.
pub fn initialize_engine(
    config: &SubmitterConfig,
    stores: &SubmissionStores,
) -> Result<SubmitterEngine> {
    let encryption = Arc::new(
        FieldEncryption::from_base64_key(&config.channel_account_encryption_key)
            .wrap_err("loading the channel account encryption key")?,
    );
    let distribution_signer = DistributionAccountEnvSigner::new(&config.distribution_seed)
        .wrap_err("loading the distribution account seed")?;
    let host_account = DistributionAccount {
        address: distribution_signer.address().to_string(),
        account_type: DistributionAccountType::StellarEnv,
    };
    info!(address = %host_account.address, "using host distribution account");

    let horizon = Arc::new(HorizonClient::new(
        &config.horizon_url,
        config.provider_timeout_seconds,
    )?);
    let soroban = match &config.rpc_url {
        Some(url) => Some(Arc::new(SorobanRpcClient::new(url)?) as Arc<dyn SorobanRpcTrait>),
        None => {
            info!("RPC_URL is not set, transactions that need simulation will fail to build");
            None
        }
    };

    let engine = SubmitterEngine {
        ledger_number_tracker: Arc::new(LedgerNumberTracker::new(
            horizon.clone(),
            config.ledger_number_max_age,
        )),
        horizon,
        soroban,
        channel_signer: Arc::new(ChannelAccountDbSigner::new(
            stores.channel_accounts.clone(),
            encryption,
        )),
        distribution_signer: Arc::new(distribution_signer),
        distribution_resolver: Arc::new(StaticDistributionAccountResolver::new(host_account)),
        max_base_fee: config.max_base_fee,
        network_passphrase: config.network_passphrase.clone(),
    };
    engine.validate()?;
    Ok(engine)
}

/// Redis stream producer when enabled, otherwise events are only logged.
pub async fn initialize_event_producer(
    config: &SubmitterConfig,
) -> Result<Arc<dyn EventProducer>> {
    if config.event_stream_enabled {
        let connection = initialize_redis_connection(&config.redis_url)
            .await
            .wrap_err("connecting to redis for the event stream")?;
        info!("publishing events to redis streams");
        Ok(Arc::new(RedisStreamProducer::new(
            connection,
            &config.redis_key_prefix,
        )))
    } else {
        Ok(Arc::new(LoggingEventProducer))
    }
}

pub async fn initialize_manager(config: &SubmitterConfig) -> Result<Manager> {
    let stores = initialize_stores(config).await?;
    let engine = initialize_engine(config, &stores)?;
    let event_producer = initialize_event_producer(config).await?;

    let manager = Manager::new(ManagerOptions {
        num_channel_accounts: config.num_channel_accounts,
        queue_polling_interval: config.queue_polling_interval,
        engine,
        stores,
        observer: Arc::new(MetricsTransactionObserver),
        crash_tracker: Arc::new(LoggingCrashTracker),
        event_producer: Some(event_producer),
    })
    .await?;
    Ok(manager)
}
