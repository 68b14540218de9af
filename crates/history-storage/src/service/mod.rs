//! # Service Layer
//!
//! Event bridge, transaction dispatcher, ledger replica and the service
//! that wires them to the node's event bus.

pub mod bridge;
pub mod dispatcher;
pub mod ledger;
pub mod runtime;

pub use bridge::{BridgeState, EventBridge};
pub use dispatcher::TransactionDispatcher;
pub use ledger::GlobalLockLedger;
pub use runtime::{seed_genesis, HistoryStorageService, QUEUE_CAPACITY, SUBSCRIBER};
