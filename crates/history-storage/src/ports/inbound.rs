//! # Inbound Ports (Driving Ports)

use async_trait::async_trait;
use num_bigint::BigInt;

use crate::domain::{BalanceChange, HistoryError};

/// The only writer of account balances.
///
/// Implementations must make each read-modify-write of a balance atomic
/// with respect to every other call on the same replica.
#[async_trait]
pub trait LedgerReplica: Send + Sync {
    /// Add `amount` to (credit) or subtract it from (debit) the balance of
    /// `address`.
    ///
    /// ## Returns
    ///
    /// - `Err(UnknownSourceAddress)`: debit of an address with no account
    /// - `Err(Storage)`: backend failure, or a stored balance that is not
    ///   an integer
    ///
    /// A credit to an unseen address creates the account.
    async fn apply_delta(
        &self,
        address: &str,
        amount: &BigInt,
        change: BalanceChange,
    ) -> Result<(), HistoryError>;

    /// Balance update driven by `SetBalance` transactions.
    ///
    /// This is an additive credit, not an absolute assignment.
    async fn set_absolute_credit(
        &self,
        address: &str,
        amount: &BigInt,
    ) -> Result<(), HistoryError> {
        self.apply_delta(address, amount, BalanceChange::Credit).await
    }
}
