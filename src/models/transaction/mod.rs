//! Transaction rows processed by the submission service.
//!
//! A row is the unit of work: one submission attempt for a business entity
//! identified by `external_id`. Retries insert a new row with the same
//! `external_id` instead of resetting a terminal one.
mod status;
pub use status::*;

mod details;
pub use details::*;

mod validation;

mod updates;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot recorded each time the status or the submission evidence changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatusHistoryEntry {
    pub status: TransactionStatus,
    pub status_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub stellar_transaction_hash: Option<String>,
    pub xdr_sent: Option<String>,
    pub xdr_received: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub external_id: String,
    pub tenant_id: String,
    pub details: TransactionDetails,
    pub status: TransactionStatus,
    pub status_message: Option<String>,
    #[serde(default)]
    pub status_history: Vec<TransactionStatusHistoryEntry>,
    #[serde(default)]
    pub attempts_count: u32,
    pub stellar_transaction_hash: Option<String>,
    pub xdr_sent: Option<String>,
    pub xdr_received: Option<String>,
    pub distribution_account: Option<String>,
    pub locked_until_ledger_number: Option<u32>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Creates a `Pending` row ready to be inserted in a store.
    pub fn new(external_id: &str, tenant_id: &str, details: TransactionDetails) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            tenant_id: tenant_id.to_string(),
            details,
            status: TransactionStatus::Pending,
            status_message: None,
            status_history: Vec::new(),
            attempts_count: 0,
            stellar_transaction_hash: None,
            xdr_sent: None,
            xdr_received: None,
            distribution_account: None,
            locked_until_ledger_number: None,
            locked_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            sent_at: None,
            completed_at: None,
            synced_at: None,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.details.transaction_type()
    }

    /// A row is locked while the ledger has not advanced past its lock.
    pub fn is_locked(&self, current_ledger_number: u32) -> bool {
        is_locked_at(self.locked_until_ledger_number, current_ledger_number)
    }

    /// A hash means the envelope may have reached the network.
    pub fn has_been_submitted(&self) -> bool {
        self.stellar_transaction_hash
            .as_deref()
            .is_some_and(|hash| !hash.is_empty())
    }

    /// Appends the current state to the status history and bumps `updated_at`.
    pub(crate) fn record_history(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.status_history.push(TransactionStatusHistoryEntry {
            status: self.status,
            status_message: self.status_message.clone(),
            timestamp: now,
            stellar_transaction_hash: self.stellar_transaction_hash.clone(),
            xdr_sent: self.xdr_sent.clone(),
            xdr_received: self.xdr_received.clone(),
        });
    }
}

/// Shared lock predicate for transactions and channel accounts.
pub fn is_locked_at(locked_until: Option<u32>, current_ledger_number: u32) -> bool {
    matches!(locked_until, Some(locked_until) if current_ledger_number <= locked_until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::payment_details;

    #[test]
    fn test_new_transaction_defaults() {
        let tx = Transaction::new("payment-1", "tenant-1", payment_details());

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.transaction_type(), TransactionType::Payment);
        assert_eq!(tx.attempts_count, 0);
        assert!(tx.status_history.is_empty());
        assert!(!tx.has_been_submitted());
        assert!(!tx.is_locked(1));
        assert!(Uuid::parse_str(&tx.id).is_ok());
    }

    #[test]
    fn test_lock_is_expressed_in_ledgers() {
        assert!(is_locked_at(Some(10), 10));
        assert!(is_locked_at(Some(10), 3));
        assert!(!is_locked_at(Some(10), 11));
        assert!(!is_locked_at(None, 0));
    }

    #[test]
    fn test_empty_hash_is_not_submitted() {
        let mut tx = Transaction::new("payment-1", "tenant-1", payment_details());
        tx.stellar_transaction_hash = Some(String::new());
        assert!(!tx.has_been_submitted());

        tx.stellar_transaction_hash = Some("abc".to_string());
        assert!(tx.has_been_submitted());
    }

    #[test]
    fn test_record_history_snapshots_state() {
        let mut tx = Transaction::new("payment-1", "tenant-1", payment_details());
        tx.status = TransactionStatus::Processing;
        tx.xdr_sent = Some("AAAA".to_string());
        tx.record_history();

        assert_eq!(tx.status_history.len(), 1);
        let entry = &tx.status_history[0];
        assert_eq!(entry.status, TransactionStatus::Processing);
        assert_eq!(entry.xdr_sent.as_deref(), Some("AAAA"));
        assert_eq!(entry.timestamp, tx.updated_at);
    }

    #[test]
    fn test_serializes_type_tag() {
        let tx = Transaction::new("payment-1", "tenant-1", payment_details());
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["details"]["transaction_type"], "PAYMENT");
        assert_eq!(value["status"], "PENDING");

        let back: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, tx);
    }
}
