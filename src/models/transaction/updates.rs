//! State changes applied by every store backend.
//!
//! Stores load a row, apply one of these and persist it; the guards here
//! play the role of the `WHERE` clauses of the updates.
use chrono::Utc;
use soroban_rs::xdr::{Limits, ReadXdr, TransactionEnvelope, TransactionResult};

use super::{Transaction, TransactionStatus};
use crate::{models::RepositoryError, utils::is_valid_account_address};

impl Transaction {
    pub fn mark_success(&mut self) -> Result<(), RepositoryError> {
        self.status.can_transition_to(TransactionStatus::Success)?;
        self.status = TransactionStatus::Success;
        self.status_message = None;
        self.completed_at = Some(Utc::now());
        self.record_history();
        Ok(())
    }

    pub fn mark_error(&mut self, message: &str) -> Result<(), RepositoryError> {
        self.status.can_transition_to(TransactionStatus::Error)?;
        self.status = TransactionStatus::Error;
        self.status_message = Some(message.to_string());
        self.completed_at = Some(Utc::now());
        self.record_history();
        Ok(())
    }

    /// Records the envelope about to be submitted and counts the attempt.
    pub fn record_submission(
        &mut self,
        hash: &str,
        xdr_sent: &str,
        distribution_account: &str,
    ) -> Result<(), RepositoryError> {
        if hash.len() != 64 || hex::decode(hash).is_err() {
            return Err(RepositoryError::InvalidData(format!(
                "invalid transaction hash {hash:?}"
            )));
        }
        if !is_valid_account_address(distribution_account) {
            return Err(RepositoryError::InvalidData(format!(
                "invalid distribution account {distribution_account:?}"
            )));
        }
        TransactionEnvelope::from_xdr_base64(xdr_sent, Limits::none())
            .map_err(|e| RepositoryError::InvalidData(format!("invalid XDR envelope: {e}")))?;

        let now = Utc::now();
        self.stellar_transaction_hash = Some(hash.to_string());
        self.xdr_sent = Some(xdr_sent.to_string());
        self.distribution_account = Some(distribution_account.to_string());
        self.sent_at = Some(now);
        self.attempts_count += 1;
        self.record_history();
        Ok(())
    }

    pub fn record_xdr_received(&mut self, xdr_received: &str) -> Result<(), RepositoryError> {
        TransactionResult::from_xdr_base64(xdr_received, Limits::none()).map_err(|e| {
            RepositoryError::InvalidData(format!("invalid XDR transaction result: {e}"))
        })?;

        self.xdr_received = Some(xdr_received.to_string());
        self.record_history();
        Ok(())
    }

    /// Clears the lock and the submission evidence so the row is rebuilt.
    pub fn prepare_for_reprocessing(&mut self) -> Result<(), RepositoryError> {
        if !self.status.is_processable() || self.synced_at.is_some() {
            return Err(RepositoryError::NotFound(format!(
                "transaction {} cannot be reprocessed",
                self.id
            )));
        }

        self.locked_at = None;
        self.locked_until_ledger_number = None;
        self.stellar_transaction_hash = None;
        self.xdr_sent = None;
        self.xdr_received = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the job selector may hand this row out at `current_ledger_number`.
    pub fn is_lockable(&self, current_ledger_number: u32) -> bool {
        self.status.is_processable()
            && self.synced_at.is_none()
            && !self.is_locked(current_ledger_number)
    }

    /// Locks the row until `lock_to_ledger_number` and moves it to `Processing`.
    pub fn lock(
        &mut self,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<(), RepositoryError> {
        if !self.is_lockable(current_ledger_number) {
            return Err(RepositoryError::NotFound(format!(
                "transaction {} cannot be locked",
                self.id
            )));
        }

        let now = Utc::now();
        self.locked_at = Some(now);
        self.locked_until_ledger_number = Some(lock_to_ledger_number);
        self.status = TransactionStatus::Processing;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn unlock(&mut self) {
        self.locked_at = None;
        self.locked_until_ledger_number = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_synced(&mut self) -> Result<(), RepositoryError> {
        if !self.status.is_terminal() {
            return Err(RepositoryError::ConstraintViolation(format!(
                "transaction {} is not in a terminal state",
                self.id
            )));
        }
        self.synced_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }
}
