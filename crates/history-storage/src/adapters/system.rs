//! Default hasher and clock.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::ports::{TimeSource, TxHasher};

/// SHA-256 of the raw transaction bytes, upper-case hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256TxHasher;

impl TxHasher for Sha256TxHasher {
    fn hash_tx(&self, tx: &[u8]) -> String {
        hex::encode_upper(Sha256::digest(tx))
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
