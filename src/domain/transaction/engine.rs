//! Collaborators shared by every worker of the process.
use std::sync::Arc;

use soroban_rs::xdr::Hash;
use thiserror::Error;

use super::HandlerError;
use crate::{
    constants::{MIN_BASE_FEE, PUBLIC_NETWORK_PASSPHRASE, TEST_NETWORK_PASSPHRASE},
    services::{
        DistributionAccountResolver, HorizonClientTrait, LedgerNumberTrackerTrait,
        SorobanRpcTrait, StellarSignTrait,
    },
    utils::network_id,
};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("max base fee must be at least {MIN_BASE_FEE}, got {0}")]
    InvalidMaxBaseFee(u32),
    #[error("network passphrase {0:?} is not a known Stellar network")]
    UnsupportedNetwork(String),
}

/// Read-only bundle resolved once at startup and shared by all workers.
#[derive(Clone)]
pub struct SubmitterEngine {
    pub horizon: Arc<dyn HorizonClientTrait>,
    /// Only needed by handlers that simulate their transactions.
    pub soroban: Option<Arc<dyn SorobanRpcTrait>>,
    pub ledger_number_tracker: Arc<dyn LedgerNumberTrackerTrait>,
    pub channel_signer: Arc<dyn StellarSignTrait>,
    pub distribution_signer: Arc<dyn StellarSignTrait>,
    pub distribution_resolver: Arc<dyn DistributionAccountResolver>,
    pub max_base_fee: u32,
    pub network_passphrase: String,
}

impl SubmitterEngine {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_base_fee < MIN_BASE_FEE {
            return Err(EngineError::InvalidMaxBaseFee(self.max_base_fee));
        }
        if self.network_passphrase != PUBLIC_NETWORK_PASSPHRASE
            && self.network_passphrase != TEST_NETWORK_PASSPHRASE
        {
            return Err(EngineError::UnsupportedNetwork(
                self.network_passphrase.clone(),
            ));
        }
        Ok(())
    }

    pub fn network_id(&self) -> Hash {
        network_id(&self.network_passphrase)
    }

    pub fn soroban(&self) -> Result<&Arc<dyn SorobanRpcTrait>, HandlerError> {
        self.soroban.as_ref().ok_or(HandlerError::MissingRpcClient)
    }
}
