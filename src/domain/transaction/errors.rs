//! Classification of submission failures into retryable and terminal outcomes.
use std::fmt;

use strum::Display;
use thiserror::Error;

use crate::{
    models::{RepositoryError, SignerError},
    services::provider::{HorizonProblem, HorizonResultCodes, ProviderError},
};

const TERMINAL_TX_CODES: [&str; 3] = ["tx_bad_auth", "tx_bad_auth_extra", "tx_insufficient_balance"];

const TERMINAL_OP_CODES: [&str; 8] = [
    "op_bad_auth",
    "op_underfunded",
    "op_src_not_authorized",
    "op_no_destination",
    "op_no_trust",
    "op_line_full",
    "op_not_authorized",
    "op_no_issuer",
];

/// A failed Horizon call, with the problem document when Horizon sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonErrorWrapper {
    pub status_code: u16,
    pub problem: Option<HorizonProblem>,
    pub result_codes: Option<HorizonResultCodes>,
    pub result_xdr: Option<String>,
    pub cause: ProviderError,
}

impl HorizonErrorWrapper {
    pub fn new(cause: ProviderError) -> Self {
        match &cause {
            ProviderError::Horizon(problem) => Self {
                status_code: problem.status,
                result_codes: problem.result_codes().cloned(),
                result_xdr: problem.result_xdr().map(str::to_string),
                problem: Some((**problem).clone()),
                cause,
            },
            _ => Self {
                status_code: cause.status_code().unwrap_or_default(),
                problem: None,
                result_codes: None,
                result_xdr: None,
                cause,
            },
        }
    }

    pub fn is_horizon_error(&self) -> bool {
        self.problem.is_some()
    }

    pub fn is_not_found(&self) -> bool {
        self.is_horizon_error() && self.status_code == 404
    }

    pub fn is_rate_limit(&self) -> bool {
        self.is_horizon_error() && self.status_code == 429
    }

    pub fn is_gateway_timeout(&self) -> bool {
        self.is_horizon_error() && self.status_code == 504
    }

    pub fn has_result_codes(&self) -> bool {
        self.is_horizon_error() && self.result_codes.is_some()
    }

    fn codes(&self) -> Option<&HorizonResultCodes> {
        if self.is_horizon_error() {
            self.result_codes.as_ref()
        } else {
            None
        }
    }

    fn has_tx_code(&self, codes: &[&str]) -> bool {
        self.codes().is_some_and(|c| {
            [&c.transaction, &c.inner_transaction]
                .into_iter()
                .flatten()
                .any(|code| codes.contains(&code.as_str()))
        })
    }

    fn has_op_code(&self, codes: &[&str]) -> bool {
        self.codes()
            .is_some_and(|c| c.operations.iter().any(|op| codes.contains(&op.as_str())))
    }

    /// Only the outer transaction code reports fee problems.
    pub fn is_tx_insufficient_fee(&self) -> bool {
        self.codes()
            .is_some_and(|c| c.transaction.as_deref() == Some("tx_insufficient_fee"))
    }

    pub fn is_not_enough_lumens(&self) -> bool {
        self.has_tx_code(&["tx_insufficient_balance"]) || self.has_op_code(&["op_underfunded"])
    }

    pub fn is_no_source_account(&self) -> bool {
        self.has_tx_code(&["tx_no_source_account"]) || self.has_op_code(&["op_no_source_account"])
    }

    pub fn is_no_issuer(&self) -> bool {
        self.has_op_code(&["op_no_issuer"])
    }

    pub fn is_source_not_authorized(&self) -> bool {
        self.has_op_code(&["op_src_not_authorized"])
    }

    pub fn is_source_no_trustline(&self) -> bool {
        self.has_op_code(&["op_src_no_trust"])
    }

    pub fn is_destination_not_authorized(&self) -> bool {
        self.has_op_code(&["op_not_authorized"])
    }

    pub fn is_destination_no_trustline(&self) -> bool {
        self.has_op_code(&["op_no_trust"])
    }

    pub fn is_destination_line_full(&self) -> bool {
        self.has_op_code(&["op_line_full"])
    }

    pub fn is_no_destination_account(&self) -> bool {
        self.has_op_code(&["op_no_destination"])
    }

    pub fn is_bad_authentication(&self) -> bool {
        self.has_tx_code(&["tx_bad_auth", "tx_bad_auth_extra"]) || self.has_op_code(&["op_bad_auth"])
    }

    /// The source account lacks funds, trust or authorization to send.
    pub fn is_source_account_not_ready(&self) -> bool {
        self.is_not_enough_lumens()
            || self.is_no_source_account()
            || self.is_source_not_authorized()
            || self.is_source_no_trustline()
    }

    /// The receiving side is not set up to accept the payment.
    pub fn is_destination_account_not_ready(&self) -> bool {
        self.is_destination_not_authorized()
            || self.is_destination_no_trustline()
            || self.is_no_destination_account()
            || self.is_destination_line_full()
    }

    /// Whether the failure is final for this transaction. Anything else is
    /// retried on a later scheduler pass.
    pub fn should_mark_as_error(&self) -> bool {
        self.has_tx_code(&TERMINAL_TX_CODES) || self.has_op_code(&TERMINAL_OP_CODES)
    }

    fn write_extras(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(codes) = self.codes() else {
            return Ok(());
        };

        let mut extras = Vec::new();
        if let Some(code) = codes.transaction.as_deref().filter(|c| !c.is_empty()) {
            extras.push(format!("transaction: {code}"));
        }
        if let Some(code) = codes.inner_transaction.as_deref().filter(|c| !c.is_empty()) {
            extras.push(format!("inner transaction: {code}"));
        }
        if !codes.operations.is_empty() {
            extras.push(format!("operation codes: [ {} ]", codes.operations.join(", ")));
        }

        if !extras.is_empty() {
            write!(f, ", Extras={}", extras.join(" - "))?;
        }
        Ok(())
    }
}

impl fmt::Display for HorizonErrorWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(problem) = &self.problem else {
            return write!(f, "horizon response error: {}", self.cause);
        };

        write!(f, "horizon response error: StatusCode={}", self.status_code)?;
        if !problem.problem_type.is_empty() {
            write!(f, ", Type={}", problem.problem_type)?;
        }
        if !problem.title.is_empty() {
            write!(f, ", Title={}", problem.title)?;
        }
        if !problem.detail.is_empty() {
            write!(f, ", Detail={}", problem.detail)?;
        }
        self.write_extras(f)
    }
}

impl std::error::Error for HorizonErrorWrapper {}

impl From<ProviderError> for HorizonErrorWrapper {
    fn from(error: ProviderError) -> Self {
        Self::new(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SimulationErrorKind {
    Network,
    Resource,
    ContractExecution,
    Auth,
}

/// A failed Soroban RPC simulation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rpc simulation error ({kind}): {message}")]
pub struct RpcErrorWrapper {
    pub kind: SimulationErrorKind,
    pub message: String,
}

impl RpcErrorWrapper {
    /// Wraps a failure to reach the RPC server or decode its answer.
    pub fn from_provider_error(error: &ProviderError) -> Self {
        let kind = if error.is_transient() {
            SimulationErrorKind::Network
        } else {
            SimulationErrorKind::ContractExecution
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }

    /// Wraps the `error` field of a simulation response.
    pub fn from_simulation_error(message: &str) -> Self {
        let lowered = message.to_lowercase();
        let kind = if ["budget", "cpu limit", "memory limit", "exceeded limit", "resource"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            SimulationErrorKind::Resource
        } else if lowered.contains("auth") {
            SimulationErrorKind::Auth
        } else {
            SimulationErrorKind::ContractExecution
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }

    /// Network and resource failures may succeed later, contract and auth
    /// failures will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SimulationErrorKind::Network | SimulationErrorKind::Resource
        )
    }
}

/// Why a transaction could not be built before submission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("simulating transaction: {0}")]
    Rpc(#[from] RpcErrorWrapper),
    #[error("soroban rpc client is not configured")]
    MissingRpcClient,
    #[error("encoding transaction: {0}")]
    Xdr(String),
}

impl From<crate::utils::XdrError> for HandlerError {
    fn from(error: crate::utils::XdrError) -> Self {
        HandlerError::Xdr(error.to_string())
    }
}

impl From<soroban_rs::xdr::Error> for HandlerError {
    fn from(error: soroban_rs::xdr::Error) -> Self {
        HandlerError::Xdr(error.to_string())
    }
}

/// Failure of a submission attempt, as seen by the worker and the limiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Horizon(#[from] HorizonErrorWrapper),
    #[error(transparent)]
    Rpc(#[from] RpcErrorWrapper),
}

impl SubmissionError {
    /// Responses that say nothing about the transaction itself and hint at
    /// network congestion.
    pub fn is_indeterminate(&self) -> bool {
        match self {
            SubmissionError::Horizon(e) => {
                e.is_horizon_error()
                    && (e.is_rate_limit() || e.is_gateway_timeout() || e.is_tx_insufficient_fee())
            }
            SubmissionError::Rpc(e) => e.is_retryable(),
        }
    }
}

/// Errors surfaced by a worker run.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("validating job: {0}")]
    InvalidJob(String),
    #[error("getting current ledger number: {0}")]
    LedgerNumber(ProviderError),
    #[error("resolving distribution account for tenant {tenant_id}: {reason}")]
    DistributionAccount { tenant_id: String, reason: String },
    #[error("{0}")]
    UnsupportedDistributionAccount(String),
    #[error("getting channel account sequence: {0}")]
    ChannelAccountSequence(HorizonErrorWrapper),
    #[error("building transaction: {0}")]
    Build(#[from] HandlerError),
    #[error("signing transaction: {0}")]
    Signing(#[from] SignerError),
    #[error("preparing fee bump transaction: {0}")]
    FeeBump(String),
    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("unexpected error: {0}")]
    UnexpectedReconciliation(SubmissionError),
    #[error("transaction {0} was reported unsuccessful")]
    UnsuccessfulTransaction(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::HorizonProblemExtras;

    fn horizon_error(
        status: u16,
        tx: Option<&str>,
        inner: Option<&str>,
        ops: &[&str],
    ) -> HorizonErrorWrapper {
        let result_codes = if tx.is_none() && inner.is_none() && ops.is_empty() {
            None
        } else {
            Some(HorizonResultCodes {
                transaction: tx.map(str::to_string),
                inner_transaction: inner.map(str::to_string),
                operations: ops.iter().map(|s| s.to_string()).collect(),
            })
        };
        HorizonErrorWrapper::new(ProviderError::Horizon(Box::new(HorizonProblem {
            problem_type: "https://stellar.org/horizon-errors/transaction_failed".to_string(),
            title: "Transaction Failed".to_string(),
            status,
            detail: String::new(),
            extras: Some(HorizonProblemExtras {
                result_codes,
                result_xdr: Some("AAAA".to_string()),
                envelope_xdr: None,
            }),
        })))
    }

    #[test]
    fn test_display_with_extras() {
        let err = horizon_error(
            400,
            Some("tx_fee_bump_inner_failed"),
            Some("tx_failed"),
            &["op_no_trust", "op_success"],
        );
        assert_eq!(
            err.to_string(),
            "horizon response error: StatusCode=400, \
             Type=https://stellar.org/horizon-errors/transaction_failed, \
             Title=Transaction Failed, \
             Extras=transaction: tx_fee_bump_inner_failed - inner transaction: tx_failed - \
             operation codes: [ op_no_trust, op_success ]"
        );
    }

    #[test]
    fn test_display_without_problem() {
        let err = HorizonErrorWrapper::new(ProviderError::Timeout);
        assert!(!err.is_horizon_error());
        assert_eq!(err.to_string(), "horizon response error: Request timeout");
    }

    #[test]
    fn test_status_predicates_require_problem() {
        assert!(horizon_error(404, None, None, &[]).is_not_found());
        assert!(horizon_error(429, None, None, &[]).is_rate_limit());
        assert!(horizon_error(504, None, None, &[]).is_gateway_timeout());

        let plain = HorizonErrorWrapper::new(ProviderError::RateLimited);
        assert_eq!(plain.status_code, 429);
        assert!(!plain.is_rate_limit());
    }

    #[test]
    fn test_insufficient_fee_only_checks_outer_code() {
        assert!(horizon_error(400, Some("tx_insufficient_fee"), None, &[]).is_tx_insufficient_fee());
        assert!(!horizon_error(400, None, Some("tx_insufficient_fee"), &[]).is_tx_insufficient_fee());
    }

    #[test]
    fn test_account_readiness() {
        let err = horizon_error(400, None, Some("tx_insufficient_balance"), &[]);
        assert!(err.is_not_enough_lumens());
        assert!(err.is_source_account_not_ready());
        assert!(!err.is_destination_account_not_ready());

        assert!(horizon_error(400, None, None, &["op_src_no_trust"]).is_source_account_not_ready());
        assert!(horizon_error(400, Some("tx_no_source_account"), None, &[])
            .is_source_account_not_ready());

        for op in ["op_not_authorized", "op_no_trust", "op_no_destination", "op_line_full"] {
            assert!(
                horizon_error(400, None, None, &[op]).is_destination_account_not_ready(),
                "{op}"
            );
        }
    }

    #[test]
    fn test_bad_authentication() {
        assert!(horizon_error(400, Some("tx_bad_auth_extra"), None, &[]).is_bad_authentication());
        assert!(horizon_error(400, None, None, &["op_bad_auth"]).is_bad_authentication());
        assert!(!horizon_error(400, Some("tx_bad_seq"), None, &[]).is_bad_authentication());
    }

    #[test]
    fn test_should_mark_as_error_classification() {
        let terminal: Vec<HorizonErrorWrapper> = vec![
            horizon_error(400, Some("tx_bad_auth"), None, &[]),
            horizon_error(400, Some("tx_bad_auth_extra"), None, &[]),
            horizon_error(400, None, Some("tx_insufficient_balance"), &[]),
            horizon_error(400, Some("tx_failed"), None, &["op_bad_auth"]),
            horizon_error(400, Some("tx_failed"), None, &["op_underfunded"]),
            horizon_error(400, Some("tx_failed"), None, &["op_src_not_authorized"]),
            horizon_error(400, Some("tx_failed"), None, &["op_no_destination"]),
            horizon_error(400, Some("tx_failed"), None, &["op_no_trust"]),
            horizon_error(400, Some("tx_failed"), None, &["op_line_full"]),
            horizon_error(400, Some("tx_failed"), None, &["op_not_authorized"]),
            horizon_error(400, Some("tx_failed"), None, &["op_no_issuer"]),
        ];
        for err in terminal {
            assert!(err.should_mark_as_error(), "{err}");
        }

        let retryable: Vec<HorizonErrorWrapper> = vec![
            horizon_error(400, Some("tx_insufficient_fee"), None, &[]),
            horizon_error(400, Some("tx_too_late"), None, &[]),
            horizon_error(400, Some("tx_bad_seq"), None, &[]),
            horizon_error(400, Some("tx_failed"), None, &["op_success"]),
            horizon_error(429, None, None, &[]),
            horizon_error(500, None, None, &[]),
            horizon_error(504, None, None, &[]),
            HorizonErrorWrapper::new(ProviderError::Timeout),
            HorizonErrorWrapper::new(ProviderError::TransportError("reset".into())),
        ];
        for err in retryable {
            assert!(!err.should_mark_as_error(), "{err}");
        }
    }

    #[test]
    fn test_result_xdr_is_kept() {
        let err = horizon_error(400, Some("tx_failed"), None, &[]);
        assert_eq!(err.result_xdr.as_deref(), Some("AAAA"));
    }

    #[test]
    fn test_rpc_error_retryability() {
        assert!(RpcErrorWrapper::from_provider_error(&ProviderError::Timeout).is_retryable());
        assert!(RpcErrorWrapper::from_provider_error(&ProviderError::RateLimited).is_retryable());
        assert!(RpcErrorWrapper::from_provider_error(&ProviderError::RequestError {
            error: "bad gateway".into(),
            status_code: 503
        })
        .is_retryable());
        assert!(!RpcErrorWrapper::from_provider_error(&ProviderError::Other("x".into()))
            .is_retryable());

        let resource = RpcErrorWrapper::from_simulation_error("HostError: Budget, ExceededLimit");
        assert_eq!(resource.kind, SimulationErrorKind::Resource);
        assert!(resource.is_retryable());

        let auth = RpcErrorWrapper::from_simulation_error("Error(Auth, InvalidAction)");
        assert_eq!(auth.kind, SimulationErrorKind::Auth);
        assert!(!auth.is_retryable());

        let contract = RpcErrorWrapper::from_simulation_error("Error(Contract, #3)");
        assert_eq!(contract.kind, SimulationErrorKind::ContractExecution);
    }

    #[test]
    fn test_indeterminate_responses() {
        assert!(SubmissionError::from(horizon_error(429, None, None, &[])).is_indeterminate());
        assert!(SubmissionError::from(horizon_error(504, None, None, &[])).is_indeterminate());
        assert!(SubmissionError::from(horizon_error(400, Some("tx_insufficient_fee"), None, &[]))
            .is_indeterminate());
        assert!(!SubmissionError::from(horizon_error(400, Some("tx_bad_seq"), None, &[]))
            .is_indeterminate());
        assert!(!SubmissionError::from(HorizonErrorWrapper::new(ProviderError::Timeout))
            .is_indeterminate());
        assert!(SubmissionError::from(RpcErrorWrapper::from_simulation_error("cpu limit exceeded"))
            .is_indeterminate());
    }
}
