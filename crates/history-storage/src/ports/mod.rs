//! # Ports Layer
//!
//! - **Inbound**: the ledger replica API driven by the dispatcher.
//! - **Outbound**: storage, hashing and clock SPIs implemented by adapters.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
