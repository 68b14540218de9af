//! # Node Event Entities
//!
//! Payloads delivered by the node's event bus when a block is committed.
//!
//! ## Commit Order
//!
//! For every committed block the node publishes one `EventDataNewBlockHeader`
//! followed by exactly `header.num_txs` `EventDataTx` events, in the order the
//! transactions were executed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw transaction bytes as included in a block.
pub type Tx = Vec<u8>;

/// Header of a committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Chain identifier.
    pub chain_id: String,
    /// Block height.
    pub height: i64,
    /// Block time as reported by consensus.
    pub time: DateTime<Utc>,
    /// Number of transactions committed in this block.
    pub num_txs: i64,
}

impl BlockHeader {
    /// Create a header for `height` declaring `num_txs` transactions.
    pub fn new(chain_id: impl Into<String>, height: i64, num_txs: i64) -> Self {
        Self {
            chain_id: chain_id.into(),
            height,
            time: Utc::now(),
            num_txs,
        }
    }
}

/// "New block header" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataNewBlockHeader {
    pub header: BlockHeader,
}

/// A key/value tag attached to a transaction's execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvPair {
    pub fn new(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        }
    }
}

/// Execution result of a delivered transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDeliverTx {
    /// Application result code (0 = OK).
    pub code: u32,
    /// Free-form application log.
    pub log: String,
    /// Result tags.
    pub tags: Vec<KvPair>,
}

/// "Transaction committed" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataTx {
    /// Height of the block containing the transaction.
    pub height: i64,
    /// Position of the transaction inside its block.
    pub index: u32,
    /// Raw transaction bytes.
    pub tx: Tx,
    /// Execution result, including routing tags.
    pub result: ResponseDeliverTx,
}

impl EventDataTx {
    /// Create a transaction event with the given result tags.
    pub fn new(height: i64, index: u32, tx: impl Into<Tx>, tags: Vec<KvPair>) -> Self {
        Self {
            height,
            index,
            tx: tx.into(),
            result: ResponseDeliverTx {
                tags,
                ..Default::default()
            },
        }
    }

    /// Value of the first result tag whose key equals `key`.
    pub fn tag(&self, key: &str) -> Option<&[u8]> {
        self.result
            .tags
            .iter()
            .find(|kv| kv.key == key.as_bytes())
            .map(|kv| kv.value.as_slice())
    }
}
