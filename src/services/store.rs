use crate::{
    error::StoreError,
    models::{PaymentAttempt, ProcessedTransaction},
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Persistence for the dedup ledger, the audit log and user balances.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn is_processed(&self, tx_hash: &str) -> Result<bool, StoreError>;

    /// Appends one audit row. Rows are never read back by the verifier.
    async fn record_attempt(&self, attempt: &PaymentAttempt) -> Result<(), StoreError>;

    /// Inserts the ledger row and credits the user in one atomic step,
    /// returning the new balance.
    ///
    /// Fails with [`StoreError::Duplicate`] if the hash is already in the
    /// ledger, or with [`StoreError::BalanceOverflow`] if the new balance
    /// would exceed `i64::MAX`. In both cases nothing is written.
    async fn commit_payment(&self, tx: &ProcessedTransaction) -> Result<u64, StoreError>;

    async fn ping(&self) -> bool;
}

#[derive(Default)]
struct Ledger {
    processed: HashMap<String, ProcessedTransaction>,
    balances: HashMap<String, u64>,
    attempts: Vec<PaymentAttempt>,
}

/// Process-local store. State is lost on restart, so this is only for
/// development and tests.
#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a balance, e.g. credits granted outside of token payments.
    pub async fn set_balance(&self, user_id: &str, balance: u64) {
        self.ledger
            .lock()
            .await
            .balances
            .insert(user_id.to_string(), balance);
    }

    pub async fn balance(&self, user_id: &str) -> u64 {
        self.ledger
            .lock()
            .await
            .balances
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn attempts(&self) -> Vec<PaymentAttempt> {
        self.ledger.lock().await.attempts.clone()
    }

    pub async fn processed(&self, tx_hash: &str) -> Option<ProcessedTransaction> {
        self.ledger.lock().await.processed.get(tx_hash).cloned()
    }

    pub async fn processed_count(&self) -> usize {
        self.ledger.lock().await.processed.len()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn is_processed(&self, tx_hash: &str) -> Result<bool, StoreError> {
        Ok(self.ledger.lock().await.processed.contains_key(tx_hash))
    }

    async fn record_attempt(&self, attempt: &PaymentAttempt) -> Result<(), StoreError> {
        self.ledger.lock().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn commit_payment(&self, tx: &ProcessedTransaction) -> Result<u64, StoreError> {
        let mut ledger = self.ledger.lock().await;

        if ledger.processed.contains_key(&tx.tx_hash) {
            return Err(StoreError::Duplicate(tx.tx_hash.clone()));
        }

        let current = ledger.balances.get(&tx.user_id).copied().unwrap_or(0);
        let balance = current
            .checked_add(tx.credits_granted)
            .filter(|balance| *balance <= i64::MAX as u64)
            .ok_or_else(|| StoreError::BalanceOverflow(tx.user_id.clone()))?;

        ledger.processed.insert(tx.tx_hash.clone(), tx.clone());
        ledger.balances.insert(tx.user_id.clone(), balance);
        Ok(balance)
    }

    async fn ping(&self) -> bool {
        true
    }
}
