//! Soroban RPC access, used for transaction simulation only.
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use soroban_rs::stellar_rpc_client::{
    Client, Error as StellarClientError, SimulateTransactionResponse,
};
use soroban_rs::xdr::TransactionEnvelope;
use tracing::debug;

use super::ProviderError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SorobanRpcTrait: Send + Sync {
    async fn simulate_transaction_envelope(
        &self,
        tx_envelope: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, ProviderError>;
}

pub struct SorobanRpcClient {
    client: Client,
}

impl SorobanRpcClient {
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        let client = Client::new(url).map_err(|e| {
            ProviderError::NetworkConfiguration(format!(
                "Failed to create Stellar RPC client: {e} - URL: '{url}'"
            ))
        })?;
        Ok(Self { client })
    }
}

/// Maps a Stellar RPC client error into a `ProviderError`, keeping timeouts
/// and configuration problems distinguishable from everything else.
fn categorize_rpc_error(err: StellarClientError) -> ProviderError {
    match err {
        StellarClientError::TransactionSubmissionTimeout => ProviderError::Timeout,
        StellarClientError::InvalidRpcUrl(uri_err) => {
            ProviderError::NetworkConfiguration(format!("Invalid RPC URL: {uri_err}"))
        }
        StellarClientError::InvalidUrl(url) => {
            ProviderError::NetworkConfiguration(format!("Invalid URL: {url}"))
        }
        StellarClientError::Xdr(xdr_err) => {
            ProviderError::Other(format!("XDR processing error: {xdr_err}"))
        }
        StellarClientError::Serde(serde_err) => {
            ProviderError::Other(format!("JSON parsing error: {serde_err}"))
        }
        StellarClientError::JsonRpc(rpc_err) => {
            ProviderError::TransportError(format!("JSON-RPC error: {rpc_err}"))
        }
        StellarClientError::TransactionSimulationFailed(msg) => {
            ProviderError::Other(format!("Transaction simulation failed: {msg}"))
        }
        other => ProviderError::Other(other.to_string()),
    }
}

#[async_trait]
impl SorobanRpcTrait for SorobanRpcClient {
    async fn simulate_transaction_envelope(
        &self,
        tx_envelope: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, ProviderError> {
        debug!("simulating transaction envelope");
        self.client
            .simulate_transaction_envelope(tx_envelope, None)
            .await
            .map_err(categorize_rpc_error)
    }
}
