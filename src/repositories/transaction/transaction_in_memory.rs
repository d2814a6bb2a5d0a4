//! In-memory transaction store, sharing its state with the other in-memory stores.
use async_trait::async_trait;

use super::{sync_batch, TransactionStore};
use crate::{
    models::{RepositoryError, Transaction, TransactionType},
    repositories::SharedState,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionStore {
    state: SharedState,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SharedState) -> Self {
        Self { state }
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<Transaction, RepositoryError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), RepositoryError>,
    {
        let mut state = self.state.lock();
        let stored = state
            .transactions
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {id} not found")))?;

        // apply on a copy so a rejected update leaves the row untouched
        let mut tx = stored.clone();
        apply(&mut tx)?;
        state.transactions.insert(id.to_string(), tx.clone());
        Ok(tx)
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, transaction: Transaction) -> Result<Transaction, RepositoryError> {
        transaction
            .validate()
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;

        let mut state = self.state.lock();
        if state.transactions.contains_key(&transaction.id) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "transaction {} already exists",
                transaction.id
            )));
        }
        state
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(transaction)
    }

    async fn bulk_insert(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        for tx in &transactions {
            tx.validate()
                .map_err(|e| RepositoryError::InvalidData(format!("{}: {e}", tx.external_id)))?;
        }

        let mut state = self.state.lock();
        if let Some(tx) = transactions
            .iter()
            .find(|tx| state.transactions.contains_key(&tx.id))
        {
            return Err(RepositoryError::ConstraintViolation(format!(
                "transaction {} already exists",
                tx.id
            )));
        }
        for tx in &transactions {
            state.transactions.insert(tx.id.clone(), tx.clone());
        }
        Ok(transactions)
    }

    async fn get(&self, id: &str) -> Result<Transaction, RepositoryError> {
        self.state
            .lock()
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {id} not found")))
    }

    async fn get_all_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let state = self.state.lock();
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| external_ids.contains(&tx.external_id))
            .cloned()
            .collect();
        transactions.sort_by_key(|tx| tx.created_at);
        Ok(transactions)
    }

    async fn update_status_to_success(&self, id: &str) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.mark_success())
    }

    async fn update_status_to_error(
        &self,
        id: &str,
        message: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.mark_error(message))
    }

    async fn update_stellar_transaction_hash_and_xdr_sent(
        &self,
        id: &str,
        hash: &str,
        xdr_sent: &str,
        distribution_account: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| {
            tx.record_submission(hash, xdr_sent, distribution_account)
        })
    }

    async fn update_stellar_transaction_xdr_received(
        &self,
        id: &str,
        xdr_received: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.record_xdr_received(xdr_received))
    }

    async fn prepare_transaction_for_reprocessing(
        &self,
        id: &str,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.prepare_for_reprocessing())
    }

    async fn lock(
        &self,
        id: &str,
        current_ledger_number: u32,
        lock_to_ledger_number: u32,
    ) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| tx.lock(current_ledger_number, lock_to_ledger_number))
    }

    async fn unlock(&self, id: &str) -> Result<Transaction, RepositoryError> {
        self.update(id, |tx| {
            tx.unlock();
            Ok(())
        })
    }

    async fn get_transaction_batch_for_sync(
        &self,
        batch_size: usize,
        tenant_id: &str,
        transaction_type: TransactionType,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let candidates = self.state.lock().transactions.values().cloned().collect();
        Ok(sync_batch(candidates, batch_size, tenant_id, transaction_type))
    }

    async fn update_synced_transactions(
        &self,
        ids: &[String],
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut state = self.state.lock();

        let mut synced = Vec::with_capacity(ids.len());
        for id in ids {
            let mut tx = state
                .transactions
                .get(id)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(format!("transaction {id} not found")))?;
            tx.mark_synced()?;
            synced.push(tx);
        }

        for tx in &synced {
            state.transactions.insert(tx.id.clone(), tx.clone());
        }
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        fixtures::{payment_details, signed_envelope_xdr, wallet_creation_details, ACCOUNT_ADDRESS},
        TransactionStatus,
    };

    fn pending(external_id: &str) -> Transaction {
        Transaction::new(external_id, "tenant-1", payment_details())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryTransactionStore::new();
        let tx = store.insert(pending("payment-1")).await.unwrap();

        let fetched = store.get(&tx.id).await.unwrap();
        assert_eq!(fetched, tx);
        assert!(store.get("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_rows() {
        let store = InMemoryTransactionStore::new();
        let mut tx = pending("payment-1");
        tx.tenant_id = String::new();

        let err = store.insert(tx).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_bulk_insert_is_all_or_nothing() {
        let store = InMemoryTransactionStore::new();
        let mut bad = pending("payment-2");
        bad.external_id = String::new();

        assert!(store
            .bulk_insert(vec![pending("payment-1"), bad])
            .await
            .is_err());
        assert!(store
            .get_all_by_external_ids(&["payment-1".to_string()])
            .await
            .unwrap()
            .is_empty());

        let inserted = store
            .bulk_insert(vec![pending("payment-1"), pending("payment-2")])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
    }

    #[tokio::test]
    async fn test_retries_share_external_id() {
        let store = InMemoryTransactionStore::new();
        store.insert(pending("payment-1")).await.unwrap();
        store.insert(pending("payment-1")).await.unwrap();
        store.insert(pending("payment-2")).await.unwrap();

        let rows = store
            .get_all_by_external_ids(&["payment-1".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_row_untouched() {
        let store = InMemoryTransactionStore::new();
        let tx = store.insert(pending("payment-1")).await.unwrap();

        let err = store.update_status_to_success(&tx.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));
        assert_eq!(store.get(&tx.id).await.unwrap(), tx);
    }

    #[tokio::test]
    async fn test_submission_lifecycle() {
        let store = InMemoryTransactionStore::new();
        let tx = store.insert(pending("payment-1")).await.unwrap();

        let locked = store.lock(&tx.id, 100, 110).await.unwrap();
        assert_eq!(locked.status, TransactionStatus::Processing);

        let hash = "b".repeat(64);
        store
            .update_stellar_transaction_hash_and_xdr_sent(
                &tx.id,
                &hash,
                &signed_envelope_xdr(),
                ACCOUNT_ADDRESS,
            )
            .await
            .unwrap();
        let done = store.update_status_to_success(&tx.id).await.unwrap();
        let unlocked = store.unlock(&tx.id).await.unwrap();

        assert_eq!(done.status, TransactionStatus::Success);
        assert_eq!(unlocked.stellar_transaction_hash.as_deref(), Some(hash.as_str()));
        assert!(unlocked.locked_until_ledger_number.is_none());
        assert_eq!(unlocked.status_history.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_batch_and_ack() {
        let store = InMemoryTransactionStore::new();
        let first = store.insert(pending("payment-1")).await.unwrap();
        let second = store.insert(pending("payment-2")).await.unwrap();
        let wallet = store
            .insert(Transaction::new("token-1", "tenant-1", wallet_creation_details()))
            .await
            .unwrap();
        store.insert(pending("payment-3")).await.unwrap();

        for id in [&second.id, &first.id, &wallet.id] {
            store.lock(id, 1, 11).await.unwrap();
            store.update_status_to_success(id).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let batch = store
            .get_transaction_batch_for_sync(10, "tenant-1", TransactionType::Payment)
            .await
            .unwrap();
        let ids: Vec<_> = batch.iter().map(|tx| tx.id.clone()).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        store.update_synced_transactions(&ids).await.unwrap();
        assert!(store
            .get_transaction_batch_for_sync(10, "tenant-1", TransactionType::Payment)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_ack_rejects_non_terminal_rows() {
        let store = InMemoryTransactionStore::new();
        let done = store.insert(pending("payment-1")).await.unwrap();
        let open = store.insert(pending("payment-2")).await.unwrap();
        store.lock(&done.id, 1, 11).await.unwrap();
        store.update_status_to_success(&done.id).await.unwrap();

        let err = store
            .update_synced_transactions(&[done.id.clone(), open.id.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
        assert!(store.get(&done.id).await.unwrap().synced_at.is_none());
    }
}
