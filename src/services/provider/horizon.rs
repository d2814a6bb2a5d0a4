//! Horizon REST client.
//!
//! Only the handful of endpoints the submission engine needs are wrapped:
//! account sequence lookup, the root resource for the latest ledger, and
//! transaction submission and lookup.
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProviderError;

/// Result codes attached to a failed submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonResultCodes {
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub inner_transaction: Option<String>,
    #[serde(default)]
    pub operations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonProblemExtras {
    #[serde(default)]
    pub result_codes: Option<HorizonResultCodes>,
    #[serde(default)]
    pub result_xdr: Option<String>,
    #[serde(default)]
    pub envelope_xdr: Option<String>,
}

/// Problem document returned by Horizon for any non-2xx response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonProblem {
    #[serde(rename = "type", default)]
    pub problem_type: String,
    #[serde(default)]
    pub title: String,
    pub status: u16,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub extras: Option<HorizonProblemExtras>,
}

impl HorizonProblem {
    pub fn result_codes(&self) -> Option<&HorizonResultCodes> {
        self.extras.as_ref().and_then(|e| e.result_codes.as_ref())
    }

    pub fn result_xdr(&self) -> Option<&str> {
        self.extras
            .as_ref()
            .and_then(|e| e.result_xdr.as_deref())
            .filter(|xdr| !xdr.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonTransactionResponse {
    pub hash: String,
    #[serde(default)]
    pub successful: bool,
    #[serde(default)]
    pub result_xdr: String,
    #[serde(default)]
    pub envelope_xdr: String,
    #[serde(default)]
    pub ledger: u32,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    sequence: String,
}

#[derive(Debug, Deserialize)]
struct RootResponse {
    history_latest_ledger: u32,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HorizonClientTrait: Send + Sync {
    /// Returns the current sequence number of `account`.
    async fn get_account_sequence(&self, account: &str) -> Result<i64, ProviderError>;
    /// Returns the most recent ledger ingested by Horizon.
    async fn get_latest_ledger(&self) -> Result<u32, ProviderError>;
    /// Submits a base64 transaction envelope and waits for its inclusion.
    async fn submit_transaction_xdr(
        &self,
        envelope_xdr: &str,
    ) -> Result<HorizonTransactionResponse, ProviderError>;
    async fn get_transaction(
        &self,
        hash: &str,
    ) -> Result<HorizonTransactionResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HorizonClient {
    client: Client,
    base_url: String,
}

impl HorizonClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::NetworkConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Parses a successful body as `T` or turns a failed response into a
    /// `ProviderError`, keeping the Horizon problem document when there is one.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Other(format!("Failed to decode response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(problem) = serde_json::from_str::<HorizonProblem>(&body) {
            return Err(ProviderError::Horizon(Box::new(problem)));
        }

        Err(match status.as_u16() {
            429 => ProviderError::RateLimited,
            502 => ProviderError::BadGateway,
            code => ProviderError::RequestError {
                error: body,
                status_code: code,
            },
        })
    }
}

#[async_trait]
impl HorizonClientTrait for HorizonClient {
    async fn get_account_sequence(&self, account: &str) -> Result<i64, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("accounts/{}", account)))
            .send()
            .await?;
        let account_response: AccountResponse = Self::parse_response(response).await?;

        account_response.sequence.parse::<i64>().map_err(|e| {
            ProviderError::Other(format!(
                "Invalid sequence number '{}' for account {}: {}",
                account_response.sequence, account, e
            ))
        })
    }

    async fn get_latest_ledger(&self) -> Result<u32, ProviderError> {
        let response = self.client.get(self.url("")).send().await?;
        let root: RootResponse = Self::parse_response(response).await?;
        Ok(root.history_latest_ledger)
    }

    async fn submit_transaction_xdr(
        &self,
        envelope_xdr: &str,
    ) -> Result<HorizonTransactionResponse, ProviderError> {
        debug!("submitting transaction envelope to horizon");
        let response = self
            .client
            .post(self.url("transactions"))
            .form(&[("tx", envelope_xdr)])
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get_transaction(
        &self,
        hash: &str,
    ) -> Result<HorizonTransactionResponse, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("transactions/{}", hash)))
            .send()
            .await?;
        Self::parse_response(response).await
    }
}
