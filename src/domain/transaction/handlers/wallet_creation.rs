//! Smart wallet deployments for passkey public keys.
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use soroban_rs::{
    stellar_rpc_client::SimulateTransactionResponse,
    xdr::{
        ContractExecutable, ContractIdPreimage, ContractIdPreimageFromAddress,
        CreateContractArgsV2, Hash, HostFunction, InvokeHostFunctionOp, Memo, Operation,
        OperationBody, ScAddress, ScBytes, ScVal, TransactionEnvelope, Uint256, VecM,
    },
};
use tracing::debug;

use super::{
    common::{apply_simulation, build_transaction, simulate},
    HandlerMonitor, ReconciliationOutcome, TransactionHandler,
};
use crate::{
    constants::{MIN_BASE_FEE, WALLET_PUBLIC_KEY_LENGTH, WASM_HASH_LENGTH},
    domain::{HandlerError, SubmitterEngine},
    models::{
        CompletedStatus, EventMessage, EventValidationError, Transaction, TransactionType, TxJob,
        WalletCreationDetails,
    },
    utils::{
        contract_address_from_hash, contract_id, network_id, parse_account_id,
        parse_muxed_account,
    },
};

pub struct WalletCreationTransactionHandler {
    engine: Arc<SubmitterEngine>,
    monitor: HandlerMonitor,
}

/// Decoded wallet deployment inputs.
struct WalletDeployment {
    public_key: Vec<u8>,
    wasm_hash: Hash,
    salt: Uint256,
}

impl WalletDeployment {
    fn decode(details: &WalletCreationDetails) -> Result<Self, HandlerError> {
        if details.public_key.is_empty() {
            return Err(HandlerError::InvalidPayload(
                "public key cannot be empty".to_string(),
            ));
        }
        if details.wasm_hash.is_empty() {
            return Err(HandlerError::InvalidPayload(
                "wasm hash cannot be empty".to_string(),
            ));
        }

        let public_key = hex::decode(&details.public_key)
            .map_err(|e| HandlerError::InvalidPayload(format!("decoding public key: {e}")))?;
        if public_key.len() != WALLET_PUBLIC_KEY_LENGTH {
            return Err(HandlerError::InvalidPayload(format!(
                "public key must be {WALLET_PUBLIC_KEY_LENGTH} bytes, got {}",
                public_key.len()
            )));
        }

        let wasm_hash = hex::decode(&details.wasm_hash)
            .map_err(|e| HandlerError::InvalidPayload(format!("decoding wasm hash: {e}")))?;
        let wasm_hash: [u8; WASM_HASH_LENGTH] = wasm_hash.try_into().map_err(|bytes: Vec<u8>| {
            HandlerError::InvalidPayload(format!(
                "wasm hash must be {WASM_HASH_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;

        let salt = Uint256(Sha256::digest(&public_key).into());
        Ok(Self {
            public_key,
            wasm_hash: Hash(wasm_hash),
            salt,
        })
    }

    fn preimage(&self, deployer: ScAddress) -> ContractIdPreimage {
        ContractIdPreimage::Address(ContractIdPreimageFromAddress {
            address: deployer,
            salt: self.salt.clone(),
        })
    }
}

impl WalletCreationTransactionHandler {
    pub fn new(engine: Arc<SubmitterEngine>, monitor: HandlerMonitor) -> Self {
        Self { engine, monitor }
    }

    fn wallet_details(job: &TxJob) -> Result<&WalletCreationDetails, HandlerError> {
        job.transaction.details.as_wallet_creation().ok_or_else(|| {
            HandlerError::Unsupported(format!(
                "transaction {} is not a wallet creation",
                job.transaction.id
            ))
        })
    }

    /// Address the wallet of `details` is deployed to by `distribution_account`.
    ///
    /// Derived from the network, the deployer and the hash of the public key,
    /// so it is known before the deployment lands.
    pub fn contract_address(
        network_passphrase: &str,
        distribution_account: &str,
        details: &WalletCreationDetails,
    ) -> Result<String, HandlerError> {
        let deployment = WalletDeployment::decode(details)?;
        let deployer = ScAddress::Account(
            parse_account_id(distribution_account).map_err(HandlerError::InvalidPayload)?,
        );
        let hash = contract_id(
            &network_id(network_passphrase),
            deployment.preimage(deployer),
        )?;
        Ok(contract_address_from_hash(&hash))
    }

    /// The resource fee is carved out of the max base fee, never below the minimum.
    fn adjusted_base_fee(&self, response: &SimulateTransactionResponse) -> u32 {
        if response.min_resource_fee == 0 {
            return self.engine.max_base_fee;
        }
        let max_base_fee = u64::from(self.engine.max_base_fee);
        let adjusted = max_base_fee.saturating_sub(response.min_resource_fee);
        u32::try_from(adjusted)
            .unwrap_or(self.engine.max_base_fee)
            .max(MIN_BASE_FEE)
    }
}

#[async_trait]
impl TransactionHandler for WalletCreationTransactionHandler {
    async fn build_inner_transaction(
        &self,
        job: &TxJob,
        channel_account_sequence: i64,
        distribution_account: &str,
    ) -> Result<TransactionEnvelope, HandlerError> {
        let deployment = WalletDeployment::decode(Self::wallet_details(job)?)?;
        let rpc = self.engine.soroban()?;

        let deployer = ScAddress::Account(
            parse_account_id(distribution_account).map_err(HandlerError::InvalidPayload)?,
        );
        let constructor_args: VecM<ScVal> = vec![
            ScVal::Address(deployer.clone()),
            ScVal::Bytes(ScBytes(deployment.public_key.clone().try_into()?)),
        ]
        .try_into()?;

        let operation = Operation {
            source_account: Some(
                parse_muxed_account(distribution_account).map_err(HandlerError::InvalidPayload)?,
            ),
            body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
                host_function: HostFunction::CreateContractV2(CreateContractArgsV2 {
                    contract_id_preimage: deployment.preimage(deployer),
                    executable: ContractExecutable::Wasm(deployment.wasm_hash.clone()),
                    constructor_args,
                }),
                auth: VecM::default(),
            }),
        };

        let mut envelope = build_transaction(
            job,
            channel_account_sequence,
            self.engine.max_base_fee,
            Memo::None,
            vec![operation],
        )?;
        let response = simulate(rpc, &envelope).await?;
        let base_fee = self.adjusted_base_fee(&response);
        debug!(
            min_resource_fee = response.min_resource_fee,
            base_fee, "rebuilding simulated wallet creation"
        );
        apply_simulation(&mut envelope, &response, base_fee, true)?;
        Ok(envelope)
    }

    fn build_success_event(&self, job: &TxJob) -> Result<EventMessage, EventValidationError> {
        EventMessage::transaction_completed(&job.transaction, CompletedStatus::Success, "")
    }

    fn build_failure_event(
        &self,
        job: &TxJob,
        error: &str,
    ) -> Result<EventMessage, EventValidationError> {
        EventMessage::transaction_completed(&job.transaction, CompletedStatus::Failed, error)
    }

    /// Simulation data goes stale between attempts.
    fn requires_rebuild_on_retry(&self) -> bool {
        true
    }

    fn transaction_type(&self) -> TransactionType {
        TransactionType::WalletCreation
    }

    fn context_fields(&self, transaction: &Transaction) -> Vec<(&'static str, String)> {
        match transaction.details.as_wallet_creation() {
            Some(details) => vec![
                ("public_key", details.public_key.clone()),
                ("wasm_hash", details.wasm_hash.clone()),
            ],
            None => Vec::new(),
        }
    }

    fn monitor_processing_started(&self, job: &TxJob, event_id: &str) {
        self.monitor.processing_started(job, event_id);
    }

    fn monitor_processing_success(&self, job: &TxJob, event_id: &str) {
        self.monitor.processing_success(job, event_id);
    }

    fn monitor_processing_failed(
        &self,
        job: &TxJob,
        event_id: &str,
        is_retryable: bool,
        is_horizon_error: bool,
        error_stack: &str,
    ) {
        self.monitor
            .processing_failed(job, event_id, is_retryable, is_horizon_error, error_stack);
    }

    fn monitor_reconciliation_success(
        &self,
        job: &TxJob,
        event_id: &str,
        outcome: ReconciliationOutcome,
    ) {
        self.monitor.reconciliation_success(job, event_id, outcome);
    }

    fn monitor_reconciliation_failure(
        &self,
        job: &TxJob,
        event_id: &str,
        is_horizon_error: bool,
        error_stack: &str,
    ) {
        self.monitor
            .reconciliation_failure(job, event_id, is_horizon_error, error_stack);
    }
}
