//! Network providers: Horizon for accounts, ledgers and submission, Soroban
//! RPC for simulation.
use thiserror::Error;

mod horizon;
pub use horizon::*;

mod soroban_rpc;
pub use soroban_rpc::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Network configuration error: {0}")]
    NetworkConfiguration(String),
    #[error("Request timeout")]
    Timeout,
    #[error("Rate limited (HTTP 429)")]
    RateLimited,
    #[error("Bad gateway (HTTP 502)")]
    BadGateway,
    #[error("Request error (HTTP {status_code}): {error}")]
    RequestError { error: String, status_code: u16 },
    #[error("Horizon problem (HTTP {}): {}", .0.status, .0.title)]
    Horizon(Box<HorizonProblem>),
    #[error("JSON-RPC error (code {code}): {message}")]
    RpcErrorCode { code: i64, message: String },
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Other provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// HTTP status carried by the error, when the request reached a server.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimited => Some(429),
            ProviderError::BadGateway => Some(502),
            ProviderError::RequestError { status_code, .. } => Some(*status_code),
            ProviderError::Horizon(problem) => Some(problem.status),
            _ => None,
        }
    }

    /// Transport failures, throttling and upstream outages are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout
            | ProviderError::RateLimited
            | ProviderError::BadGateway
            | ProviderError::TransportError(_) => true,
            ProviderError::RequestError { status_code, .. } => *status_code >= 500,
            ProviderError::Horizon(problem) => problem.status >= 500 || problem.status == 429,
            _ => false,
        }
    }
}

/// Categorizes a reqwest error into an appropriate `ProviderError` variant.
fn categorize_reqwest_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        return ProviderError::Timeout;
    }

    if let Some(status) = err.status() {
        return match status.as_u16() {
            429 => ProviderError::RateLimited,
            502 => ProviderError::BadGateway,
            code => ProviderError::RequestError {
                error: err.to_string(),
                status_code: code,
            },
        };
    }

    if err.is_connect() || err.is_request() {
        return ProviderError::TransportError(err.to_string());
    }

    ProviderError::Other(err.to_string())
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        categorize_reqwest_error(&err)
    }
}
