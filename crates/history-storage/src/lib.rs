//! # history-storage
//!
//! Off-chain transaction history for the node.
//!
//! ## Role in System
//!
//! - **Event bus subscriber**: listens to committed block headers and
//!   transactions, never publishes except dead letters
//! - **Ledger replica**: mirrors account balances from `Send` and
//!   `SetBalance` transactions
//! - **History store**: appends one typed record per replicated transaction
//!   to MySQL or MongoDB
//!
//! ## Flow
//!
//! ```text
//! [Consensus] ──NewBlockHeader / Tx──→ [Event Bus]
//!                                          │ unbuffered
//!                                          ↓
//!                                   [EventBridge] ──queue(100)──→ [TransactionDispatcher]
//!                                                                     │
//!                                                      ┌──────────────┴──────────────┐
//!                                                      ↓                             ↓
//!                                              [LedgerReplica]              add_transaction_record
//!                                                      │                             │
//!                                                      └──────→ [HistoryStorage] ←───┘
//! ```
//!
//! The replica is best effort. It does not validate transactions and does
//! not guarantee exactly-once persistence across restarts.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::*;
pub use config::*;
pub use domain::*;
pub use ports::*;
pub use service::*;

/// `module` field value on every log line of this crate.
pub(crate) const LOG_MODULE: &str = "historydb";
