//! Value transfers from the distribution account.
use std::sync::Arc;

use async_trait::async_trait;
use soroban_rs::xdr::{
    AlphaNum12, AlphaNum4, Asset, AssetCode12, AssetCode4, ContractId, ContractIdPreimage,
    HostFunction, Int128Parts, InvokeContractArgs, InvokeHostFunctionOp, Memo, Operation,
    OperationBody, PaymentOp, ScAddress, ScSymbol, ScVal, TransactionEnvelope, VecM,
};
use tracing::debug;

use super::{
    common::{apply_simulation, build_transaction, simulate},
    HandlerMonitor, ReconciliationOutcome, TransactionHandler,
};
use crate::{
    constants::{MAX_ASSET_CODE_LENGTH, NATIVE_ASSET_CODE},
    domain::{HandlerError, SubmitterEngine},
    models::{
        CompletedStatus, EventMessage, EventValidationError, PaymentDetails, Transaction,
        TransactionType, TxJob,
    },
    utils::{
        contract_id, is_valid_account_address, is_valid_contract_address, parse_account_id,
        parse_amount, parse_memo, parse_muxed_account, parse_sc_address,
    },
};

pub struct PaymentTransactionHandler {
    engine: Arc<SubmitterEngine>,
    monitor: HandlerMonitor,
}

impl PaymentTransactionHandler {
    pub fn new(engine: Arc<SubmitterEngine>, monitor: HandlerMonitor) -> Self {
        Self { engine, monitor }
    }

    fn payment_details(job: &TxJob) -> Result<&PaymentDetails, HandlerError> {
        job.transaction.details.as_payment().ok_or_else(|| {
            HandlerError::Unsupported(format!(
                "transaction {} is not a payment",
                job.transaction.id
            ))
        })
    }

    /// Builds a Stellar Asset Contract `transfer` invocation towards a contract.
    async fn build_contract_payment(
        &self,
        job: &TxJob,
        channel_account_sequence: i64,
        distribution_account: &str,
        asset: Asset,
        amount: i64,
    ) -> Result<TransactionEnvelope, HandlerError> {
        let payment = Self::payment_details(job)?;
        let rpc = self.engine.soroban()?;

        let asset_contract = contract_id(
            &self.engine.network_id(),
            ContractIdPreimage::Asset(asset),
        )?;
        let from = parse_sc_address(distribution_account).map_err(HandlerError::InvalidPayload)?;
        let to = parse_sc_address(&payment.destination).map_err(HandlerError::InvalidPayload)?;
        let amount = i128::from(amount);

        let operation = Operation {
            source_account: Some(
                parse_muxed_account(distribution_account).map_err(HandlerError::InvalidPayload)?,
            ),
            body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
                host_function: HostFunction::InvokeContract(InvokeContractArgs {
                    contract_address: ScAddress::Contract(ContractId(asset_contract)),
                    function_name: ScSymbol("transfer".try_into()?),
                    args: vec![
                        ScVal::Address(from),
                        ScVal::Address(to),
                        ScVal::I128(Int128Parts {
                            hi: (amount >> 64) as i64,
                            lo: amount as u64,
                        }),
                    ]
                    .try_into()?,
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
        apply_simulation(&mut envelope, &response, self.engine.max_base_fee, true)?;
        Ok(envelope)
    }
}

/// Native for `XLM`, otherwise a credit asset with a valid issuer.
fn payment_asset(code: &str, issuer: &str) -> Result<Asset, HandlerError> {
    if code.is_empty() {
        return Err(HandlerError::InvalidPayload(
            "asset code cannot be empty".to_string(),
        ));
    }
    if code.eq_ignore_ascii_case(NATIVE_ASSET_CODE) {
        return Ok(Asset::Native);
    }
    if !is_valid_account_address(issuer) {
        return Err(HandlerError::InvalidPayload(format!(
            "invalid asset issuer: {issuer}"
        )));
    }
    let issuer = parse_account_id(issuer).map_err(HandlerError::InvalidPayload)?;

    let bytes = code.as_bytes();
    match bytes.len() {
        1..=4 => {
            let mut asset_code = [0u8; 4];
            asset_code[..bytes.len()].copy_from_slice(bytes);
            Ok(Asset::CreditAlphanum4(AlphaNum4 {
                asset_code: AssetCode4(asset_code),
                issuer,
            }))
        }
        5..=MAX_ASSET_CODE_LENGTH => {
            let mut asset_code = [0u8; 12];
            asset_code[..bytes.len()].copy_from_slice(bytes);
            Ok(Asset::CreditAlphanum12(AlphaNum12 {
                asset_code: AssetCode12(asset_code),
                issuer,
            }))
        }
        _ => Err(HandlerError::InvalidPayload(format!(
            "invalid asset code: {code}"
        ))),
    }
}

#[async_trait]
impl TransactionHandler for PaymentTransactionHandler {
    async fn build_inner_transaction(
        &self,
        job: &TxJob,
        channel_account_sequence: i64,
        distribution_account: &str,
    ) -> Result<TransactionEnvelope, HandlerError> {
        let payment = Self::payment_details(job)?;
        let asset = payment_asset(&payment.asset_code, &payment.asset_issuer)?;
        let amount = parse_amount(&payment.amount).map_err(HandlerError::InvalidPayload)?;
        if amount <= 0 {
            return Err(HandlerError::InvalidPayload(format!(
                "amount must be positive, got {}",
                payment.amount
            )));
        }

        if is_valid_account_address(&payment.destination) {
            let memo = parse_memo(payment.memo.as_deref(), payment.memo_type)
                .map_err(|e| HandlerError::InvalidPayload(format!("building memo: {e}")))?;
            let operation = Operation {
                source_account: Some(
                    parse_muxed_account(distribution_account)
                        .map_err(HandlerError::InvalidPayload)?,
                ),
                body: OperationBody::Payment(PaymentOp {
                    destination: parse_muxed_account(&payment.destination)
                        .map_err(HandlerError::InvalidPayload)?,
                    asset,
                    amount,
                }),
            };
            debug!(destination = %payment.destination, "building payment transaction");
            build_transaction(
                job,
                channel_account_sequence,
                self.engine.max_base_fee,
                memo,
                vec![operation],
            )
        } else if is_valid_contract_address(&payment.destination) {
            if payment.memo.as_deref().is_some_and(|memo| !memo.is_empty()) {
                return Err(HandlerError::InvalidPayload(format!(
                    "memo is not supported for contract destination ({})",
                    payment.destination
                )));
            }
            debug!(destination = %payment.destination, "building contract payment transaction");
            self.build_contract_payment(
                job,
                channel_account_sequence,
                distribution_account,
                asset,
                amount,
            )
            .await
        } else {
            Err(HandlerError::InvalidPayload(format!(
                "invalid destination account ({})",
                payment.destination
            )))
        }
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

    fn requires_rebuild_on_retry(&self) -> bool {
        false
    }

    fn transaction_type(&self) -> TransactionType {
        TransactionType::Payment
    }

    fn context_fields(&self, transaction: &Transaction) -> Vec<(&'static str, String)> {
        let Some(payment) = transaction.details.as_payment() else {
            return Vec::new();
        };
        let mut fields = vec![
            ("asset", payment.asset_code.clone()),
            ("destination_account", payment.destination.clone()),
        ];
        if let Some(memo) = payment.memo.as_deref().filter(|memo| !memo.is_empty()) {
            fields.push(("memo", memo.to_string()));
            fields.push((
                "memo_type",
                payment
                    .memo_type
                    .map(|memo_type| memo_type.to_string())
                    .unwrap_or_default(),
            ));
        }
        fields
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{test_support::EngineMocks, RpcErrorWrapper, SimulationErrorKind},
        models::{
            fixtures::{
                channel_account, payment_details, payment_details_with_memo, ACCOUNT_ADDRESS,
                CONTRACT_ADDRESS, DESTINATION_ADDRESS, OTHER_ACCOUNT_ADDRESS, USDC_ISSUER,
            },
            MemoType, TransactionDetails,
        },
        services::{MockSorobanRpcTrait, MockTransactionObserver, ProviderError},
    };
    use soroban_rs::{
        stellar_rpc_client::SimulateTransactionResponse,
        xdr::{
            LedgerFootprint, Limits, SequenceNumber, SorobanResources, SorobanTransactionData,
            SorobanTransactionDataExt, TransactionExt, WriteXdr,
        },
    };

    fn handler(mocks: EngineMocks) -> PaymentTransactionHandler {
        PaymentTransactionHandler::new(
            Arc::new(mocks.into_engine()),
            HandlerMonitor::new(Arc::new(MockTransactionObserver::new())),
        )
    }

    fn job_with(details: TransactionDetails) -> TxJob {
        let mut tx = Transaction::new("payment-1", "tenant-1", details);
        tx.locked_until_ledger_number = Some(30);
        let mut channel = channel_account(ACCOUNT_ADDRESS);
        channel.locked_until_ledger_number = Some(30);
        TxJob::new(channel, tx)
    }

    fn details_with(update: impl FnOnce(&mut PaymentDetails)) -> TransactionDetails {
        let mut details = payment_details();
        if let TransactionDetails::Payment(ref mut payment) = details {
            update(payment);
        }
        details
    }

    fn only_operation(envelope: &TransactionEnvelope) -> &Operation {
        match envelope {
            TransactionEnvelope::Tx(env) => {
                assert_eq!(env.tx.operations.len(), 1);
                &env.tx.operations[0]
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_builds_credit_payment() {
        let handler = handler(EngineMocks::default());
        let job = job_with(payment_details_with_memo("42", MemoType::Id));

        let envelope = handler
            .build_inner_transaction(&job, 10, OTHER_ACCOUNT_ADDRESS)
            .await
            .unwrap();

        let TransactionEnvelope::Tx(env) = &envelope else {
            panic!("expected v1 envelope");
        };
        assert_eq!(env.tx.seq_num, SequenceNumber(11));
        assert_eq!(env.tx.fee, 100);
        assert_eq!(env.tx.memo, Memo::Id(42));
        assert_eq!(
            env.tx.source_account,
            parse_muxed_account(ACCOUNT_ADDRESS).unwrap()
        );

        let operation = only_operation(&envelope);
        assert_eq!(
            operation.source_account,
            Some(parse_muxed_account(OTHER_ACCOUNT_ADDRESS).unwrap())
        );
        match &operation.body {
            OperationBody::Payment(op) => {
                assert_eq!(op.amount, 1_000_000_000);
                assert_eq!(
                    op.destination,
                    parse_muxed_account(DESTINATION_ADDRESS).unwrap()
                );
                assert_eq!(
                    op.asset,
                    Asset::CreditAlphanum4(AlphaNum4 {
                        asset_code: AssetCode4(*b"USDC"),
                        issuer: parse_account_id(USDC_ISSUER).unwrap(),
                    })
                );
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_native_asset_ignores_issuer() {
        let handler = handler(EngineMocks::default());
        let job = job_with(details_with(|p| {
            p.asset_code = "xlm".to_string();
            p.asset_issuer = String::new();
        }));

        let envelope = handler
            .build_inner_transaction(&job, 1, OTHER_ACCOUNT_ADDRESS)
            .await
            .unwrap();
        match &only_operation(&envelope).body {
            OperationBody::Payment(op) => assert_eq!(op.asset, Asset::Native),
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_long_asset_code_uses_alphanum12() {
        assert!(matches!(
            payment_asset("LONGASSET", USDC_ISSUER).unwrap(),
            Asset::CreditAlphanum12(_)
        ));
        assert!(payment_asset("THIRTEENCHARS", USDC_ISSUER).is_err());
    }

    #[tokio::test]
    async fn test_rejects_invalid_payloads() {
        let handler = handler(EngineMocks::default());
        let cases = [
            (
                details_with(|p| p.asset_issuer = "GBAD".to_string()),
                "invalid asset issuer: GBAD",
            ),
            (
                details_with(|p| p.asset_code = String::new()),
                "asset code cannot be empty",
            ),
            (
                details_with(|p| p.destination = "nowhere".to_string()),
                "invalid destination account (nowhere)",
            ),
            (
                details_with(|p| {
                    p.destination = CONTRACT_ADDRESS.to_string();
                    p.memo = Some("hello".to_string());
                    p.memo_type = Some(MemoType::Text);
                }),
                "memo is not supported for contract destination",
            ),
            (
                details_with(|p| p.amount = "0".to_string()),
                "amount must be positive",
            ),
        ];

        for (details, expected) in cases {
            let err = handler
                .build_inner_transaction(&job_with(details), 1, OTHER_ACCOUNT_ADDRESS)
                .await
                .unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{err} does not contain {expected}"
            );
        }
    }

    #[tokio::test]
    async fn test_contract_destination_requires_rpc() {
        let handler = handler(EngineMocks::default());
        let job = job_with(details_with(|p| p.destination = CONTRACT_ADDRESS.to_string()));

        let err = handler
            .build_inner_transaction(&job, 1, OTHER_ACCOUNT_ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::MissingRpcClient);
    }

    #[tokio::test]
    async fn test_contract_destination_is_simulated() {
        let data = SorobanTransactionData {
            ext: SorobanTransactionDataExt::V0,
            resources: SorobanResources {
                footprint: LedgerFootprint {
                    read_only: VecM::default(),
                    read_write: VecM::default(),
                },
                instructions: 1000,
                disk_read_bytes: 0,
                write_bytes: 0,
            },
            resource_fee: 7000,
        };
        let transaction_data = data.to_xdr_base64(Limits::none()).unwrap();

        let mut rpc = MockSorobanRpcTrait::new();
        rpc.expect_simulate_transaction_envelope()
            .withf(|envelope| match envelope {
                TransactionEnvelope::Tx(env) => matches!(
                    &env.tx.operations[0].body,
                    OperationBody::InvokeHostFunction(op)
                        if matches!(&op.host_function, HostFunction::InvokeContract(args)
                            if args.function_name == ScSymbol("transfer".try_into().unwrap())
                                && args.args.len() == 3)
                ),
                _ => false,
            })
            .times(1)
            .returning(move |_| {
                Ok(SimulateTransactionResponse {
                    min_resource_fee: 7000,
                    transaction_data: transaction_data.clone(),
                    ..Default::default()
                })
            });
        let mut mocks = EngineMocks::default();
        mocks.soroban = Some(rpc);
        let handler = handler(mocks);
        let job = job_with(details_with(|p| p.destination = CONTRACT_ADDRESS.to_string()));

        let envelope = handler
            .build_inner_transaction(&job, 1, OTHER_ACCOUNT_ADDRESS)
            .await
            .unwrap();

        let TransactionEnvelope::Tx(env) = &envelope else {
            panic!("expected v1 envelope");
        };
        assert_eq!(env.tx.fee, 7100);
        assert_eq!(env.tx.memo, Memo::None);
        assert!(matches!(env.tx.ext, TransactionExt::V1(_)));
    }

    #[tokio::test]
    async fn test_contract_destination_simulation_error() {
        let mut rpc = MockSorobanRpcTrait::new();
        rpc.expect_simulate_transaction_envelope()
            .returning(|_| Err(ProviderError::Timeout));
        let mut mocks = EngineMocks::default();
        mocks.soroban = Some(rpc);
        let handler = handler(mocks);
        let job = job_with(details_with(|p| p.destination = CONTRACT_ADDRESS.to_string()));

        let err = handler
            .build_inner_transaction(&job, 1, OTHER_ACCOUNT_ADDRESS)
            .await
            .unwrap_err();
        match err {
            HandlerError::Rpc(RpcErrorWrapper { kind, .. }) => {
                assert_eq!(kind, SimulationErrorKind::Network)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_context_fields_and_flags() {
        let handler = handler(EngineMocks::default());
        let job = job_with(payment_details_with_memo("hello", MemoType::Text));

        let fields = handler.context_fields(&job.transaction);
        assert_eq!(
            fields,
            vec![
                ("asset", "USDC".to_string()),
                ("destination_account", DESTINATION_ADDRESS.to_string()),
                ("memo", "hello".to_string()),
                ("memo_type", "text".to_string()),
            ]
        );
        assert!(!handler.requires_rebuild_on_retry());
        assert_eq!(handler.transaction_type(), TransactionType::Payment);
    }

    #[test]
    fn test_events() {
        let handler = handler(EngineMocks::default());
        let job = job_with(payment_details());

        let success = handler.build_success_event(&job).unwrap();
        assert_eq!(success.event_type, "payment_completed_success");

        let failure = handler.build_failure_event(&job, "op_no_trust").unwrap();
        assert_eq!(failure.event_type, "payment_completed_error");
        assert_eq!(failure.data.status_message, "op_no_trust");
    }
}
