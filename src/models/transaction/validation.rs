use soroban_rs::xdr::{InvokeHostFunctionOp, Limits, ReadXdr};

use super::{
    PaymentDetails, SponsoredDetails, Transaction, TransactionDetails, WalletCreationDetails,
};
use crate::{
    constants::{MAX_ASSET_CODE_LENGTH, NATIVE_ASSET_CODE},
    models::TransactionValidationError,
    utils::{is_valid_account_address, is_valid_contract_address, parse_amount, parse_memo},
};

impl Transaction {
    /// Validates the row before it is inserted in a store.
    pub fn validate(&self) -> Result<(), TransactionValidationError> {
        if self.external_id.trim().is_empty() {
            return Err(TransactionValidationError::MissingExternalId);
        }
        if self.tenant_id.trim().is_empty() {
            return Err(TransactionValidationError::MissingTenantId);
        }

        match &self.details {
            TransactionDetails::Payment(details) => details.validate(),
            TransactionDetails::WalletCreation(details) => details.validate(),
            TransactionDetails::Sponsored(details) => details.validate(),
        }
    }
}

impl PaymentDetails {
    pub fn is_native_asset(&self) -> bool {
        self.asset_code.eq_ignore_ascii_case(NATIVE_ASSET_CODE)
    }

    pub fn validate(&self) -> Result<(), TransactionValidationError> {
        let code = self.asset_code.trim();
        if code.is_empty() || code.len() > MAX_ASSET_CODE_LENGTH {
            return Err(TransactionValidationError::InvalidAssetCode(format!(
                "asset code must have between 1 and {MAX_ASSET_CODE_LENGTH} characters"
            )));
        }

        if !self.is_native_asset() && !is_valid_account_address(&self.asset_issuer) {
            return Err(TransactionValidationError::InvalidAssetIssuer(
                self.asset_issuer.clone(),
            ));
        }

        let amount = parse_amount(&self.amount).map_err(TransactionValidationError::InvalidAmount)?;
        if amount <= 0 {
            return Err(TransactionValidationError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }

        if !is_valid_account_address(&self.destination)
            && !is_valid_contract_address(&self.destination)
        {
            return Err(TransactionValidationError::InvalidDestination(
                self.destination.clone(),
            ));
        }

        parse_memo(self.memo.as_deref(), self.memo_type)
            .map_err(TransactionValidationError::InvalidMemo)?;

        Ok(())
    }
}

impl WalletCreationDetails {
    pub fn validate(&self) -> Result<(), TransactionValidationError> {
        if self.public_key.trim().is_empty() {
            return Err(TransactionValidationError::MissingPublicKey);
        }
        if self.wasm_hash.trim().is_empty() {
            return Err(TransactionValidationError::MissingWasmHash);
        }

        hex::decode(&self.public_key).map_err(|e| TransactionValidationError::InvalidHex {
            field: "public key",
            reason: e.to_string(),
        })?;
        hex::decode(&self.wasm_hash).map_err(|e| TransactionValidationError::InvalidHex {
            field: "wasm hash",
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

impl SponsoredDetails {
    pub fn validate(&self) -> Result<(), TransactionValidationError> {
        if !is_valid_contract_address(&self.sponsored_account) {
            return Err(TransactionValidationError::InvalidSponsoredAccount(
                self.sponsored_account.clone(),
            ));
        }
        if self.sponsored_operation_xdr.trim().is_empty() {
            return Err(TransactionValidationError::InvalidSponsoredOperation(
                "operation XDR is required".to_string(),
            ));
        }

        InvokeHostFunctionOp::from_xdr_base64(&self.sponsored_operation_xdr, Limits::none())
            .map_err(|e| TransactionValidationError::InvalidSponsoredOperation(e.to_string()))?;

        Ok(())
    }
}
