//! In-memory history store for tests and local wiring.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::domain::{Account, StorageError, TransactionRecord};
use crate::ports::HistoryStorage;
use crate::LOG_MODULE;

/// `HistoryStorage` kept in process memory.
///
/// Enforces the same uniqueness as the MySQL schema: one record per
/// transaction hash and one account per address.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    records: RwLock<Vec<TransactionRecord>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every account write for `address` fail with a connection error.
    pub fn fail_writes_for(&self, address: &str) {
        self.failing.write().insert(address.to_string());
    }

    /// Current balance of `address`, if the account exists.
    pub fn balance_of(&self, address: &str) -> Option<String> {
        self.accounts
            .read()
            .get(address)
            .map(|account| account.balance.clone())
    }

    /// All records in insertion order.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.read().clone()
    }

    pub fn record_by_hash(&self, tx_hash: &str) -> Option<TransactionRecord> {
        self.records
            .read()
            .iter()
            .find(|record| record.tx_hash() == tx_hash)
            .cloned()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    fn check_writable(&self, address: &str) -> Result<(), StorageError> {
        if self.failing.read().contains(address) {
            return Err(StorageError::Connection(format!(
                "injected write failure for {address}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStorage for InMemoryHistoryStore {
    async fn add_transaction_record(&self, record: &TransactionRecord) -> Result<(), StorageError> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.tx_hash() == record.tx_hash()) {
            return Err(StorageError::DuplicateKey(record.tx_hash().to_string()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<Option<Account>, StorageError> {
        Ok(self.accounts.read().get(address).cloned())
    }

    async fn add_account(&self, account: &Account) -> Result<(), StorageError> {
        self.check_writable(&account.address)?;
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.address) {
            return Err(StorageError::DuplicateKey(account.address.clone()));
        }
        accounts.insert(account.address.clone(), account.clone());
        Ok(())
    }

    async fn update_account_balance(
        &self,
        address: &str,
        balance: &str,
    ) -> Result<(), StorageError> {
        self.check_writable(address)?;
        match self.accounts.write().get_mut(address) {
            Some(account) => account.balance = balance.to_string(),
            None => {
                warn!(module = LOG_MODULE, address, "Balance update matched no account");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SetStakeTx, TransactionHead};
    use chrono::Utc;

    fn stake(hash: &str) -> TransactionRecord {
        TransactionRecord::SetStakeTx(SetStakeTx {
            head: TransactionHead {
                tx_hash: hash.into(),
                tx_type: "SetStake".into(),
                height: 1,
                index: 0,
                time: Utc::now(),
            },
            amount: "1".into(),
        })
    }

    #[tokio::test]
    async fn test_account_lifecycle() {
        let store = InMemoryHistoryStore::new();
        assert_eq!(store.get_account("A").await.unwrap(), None);

        store.add_account(&Account::new("A", "10")).await.unwrap();
        store.update_account_balance("A", "15").await.unwrap();

        assert_eq!(store.balance_of("A").as_deref(), Some("15"));
        assert_eq!(
            store.get_account("A").await.unwrap(),
            Some(Account::new("A", "15"))
        );
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let store = InMemoryHistoryStore::new();
        store.add_account(&Account::new("A", "1")).await.unwrap();
        let err = store.add_account(&Account::new("A", "2")).await.unwrap_err();
        assert_eq!(err, StorageError::DuplicateKey("A".into()));
        assert_eq!(store.balance_of("A").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected() {
        let store = InMemoryHistoryStore::new();
        store.add_transaction_record(&stake("H1")).await.unwrap();
        assert!(matches!(
            store.add_transaction_record(&stake("H1")).await,
            Err(StorageError::DuplicateKey(_))
        ));
        assert_eq!(store.records().len(), 1);
        assert!(store.record_by_hash("H1").is_some());
    }

    #[tokio::test]
    async fn test_update_of_missing_account_is_noop() {
        let store = InMemoryHistoryStore::new();
        store.update_account_balance("ghost", "5").await.unwrap();
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryHistoryStore::new();
        store.fail_writes_for("B");
        assert!(matches!(
            store.add_account(&Account::new("B", "1")).await,
            Err(StorageError::Connection(_))
        ));
        store.add_account(&Account::new("C", "1")).await.unwrap();
    }
}
