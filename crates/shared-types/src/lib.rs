//! # Shared Types Crate
//!
//! Types shared between the node's event bus and the services attached to it.
//!
//! - `entities`: block header and committed-transaction payloads
//! - `subsystem_trait`: lifecycle contract for bus-attached services

pub mod entities;
pub mod subsystem_trait;

pub use entities::*;
pub use subsystem_trait::{Subsystem, SubsystemError, SubsystemErrorKind, SubsystemStatus};
