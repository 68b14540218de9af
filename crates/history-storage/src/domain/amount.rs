//! Decimal integer amounts.
//!
//! Amounts and balances travel as base-10 strings and are only turned into
//! `BigInt` for arithmetic. Only an optional sign followed by ASCII digits
//! is accepted; no range checks apply.

use num_bigint::BigInt;
use std::str::FromStr;

use super::{HistoryError, StorageError};

/// Parse an amount field of a `tx_type` payload.
pub fn parse_amount(tx_type: &'static str, value: &str) -> Result<BigInt, HistoryError> {
    parse_decimal(value).ok_or_else(|| HistoryError::Amount {
        tx_type,
        value: value.to_string(),
    })
}

/// Parse a balance read back from storage.
pub fn parse_balance(address: &str, balance: &str) -> Result<BigInt, StorageError> {
    parse_decimal(balance).ok_or_else(|| {
        StorageError::Serialization(format!(
            "balance of {address} is not an integer ({balance:?})"
        ))
    })
}

/// `[+-]?[0-9]+`. `BigInt::from_str` alone also takes `_` separators.
fn parse_decimal(text: &str) -> Option<BigInt> {
    let digits = text.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigInt::from_str(text).ok()
}
