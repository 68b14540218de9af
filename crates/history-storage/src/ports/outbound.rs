//! # Outbound Ports (Driven Ports)
//!
//! SPIs required by the history replica.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Account, StorageError, TransactionRecord};

/// Persistence for transaction records and the account balance table.
///
/// Implementations never retry internally. Duplicate keys surface as
/// `StorageError::DuplicateKey`.
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    /// Append a transaction record. Records are never updated.
    async fn add_transaction_record(&self, record: &TransactionRecord) -> Result<(), StorageError>;

    /// Fetch an account by address; `Ok(None)` when it does not exist.
    async fn get_account(&self, address: &str) -> Result<Option<Account>, StorageError>;

    /// Insert a new account.
    async fn add_account(&self, account: &Account) -> Result<(), StorageError>;

    /// Overwrite the balance of an existing account.
    async fn update_account_balance(&self, address: &str, balance: &str)
        -> Result<(), StorageError>;
}

/// Hash of a raw committed transaction, rendered as upper-case hex.
pub trait TxHasher: Send + Sync {
    fn hash_tx(&self, tx: &[u8]) -> String;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
