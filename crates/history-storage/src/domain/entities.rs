//! # Core Domain Entities
//!
//! Accounts and the typed transaction records written to the history store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account row in the balance table.
///
/// `balance` is a base-10 integer string of arbitrary size. It is never
/// converted to a floating type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: String,
}

impl Account {
    pub fn new(address: impl Into<String>, balance: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: balance.into(),
        }
    }
}

/// Envelope shared by every transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHead {
    /// Upper-case hex hash of the raw transaction bytes.
    pub tx_hash: String,
    /// Type tag the transaction was routed by (e.g. `Send`).
    pub tx_type: String,
    pub height: i64,
    pub index: u32,
    /// Time the record was produced by this replica.
    pub time: DateTime<Utc>,
}

/// Token transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTx {
    #[serde(flatten)]
    pub head: TransactionHead,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
}

/// Datacenter metering report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metering {
    #[serde(flatten)]
    pub head: TransactionHead,
    pub dc: String,
    pub ns: String,
    pub value: String,
}

/// Administrative balance credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBalanceTx {
    #[serde(flatten)]
    pub head: TransactionHead,
    pub address: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStakeTx {
    #[serde(flatten)]
    pub head: TransactionHead,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetValidatorTx {
    #[serde(flatten)]
    pub head: TransactionHead,
    pub validator_pubkey: String,
    pub power: String,
}

/// Any record the dispatcher can persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record")]
pub enum TransactionRecord {
    SendTx(SendTx),
    Metering(Metering),
    SetBalanceTx(SetBalanceTx),
    SetStakeTx(SetStakeTx),
    SetValidatorTx(SetValidatorTx),
}

impl TransactionRecord {
    pub fn head(&self) -> &TransactionHead {
        match self {
            Self::SendTx(r) => &r.head,
            Self::Metering(r) => &r.head,
            Self::SetBalanceTx(r) => &r.head,
            Self::SetStakeTx(r) => &r.head,
            Self::SetValidatorTx(r) => &r.head,
        }
    }

    pub fn tx_hash(&self) -> &str {
        &self.head().tx_hash
    }

    /// Record variant name, used as a metric label and log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendTx(_) => "SendTx",
            Self::Metering(_) => "Metering",
            Self::SetBalanceTx(_) => "SetBalanceTx",
            Self::SetStakeTx(_) => "SetStakeTx",
            Self::SetValidatorTx(_) => "SetValidatorTx",
        }
    }
}
