//! # Domain Layer
//!
//! Records, accounts, transaction kinds and their payload parsers.
//!
//! This module contains NO I/O dependencies. Storage and hashing sit behind
//! the traits in the `ports` module.

pub mod amount;
pub mod entities;
pub mod errors;
pub mod tx_kind;

pub use amount::*;
pub use entities::*;
pub use errors::*;
pub use tx_kind::*;
