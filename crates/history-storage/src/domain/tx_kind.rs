//! # Transaction Kinds
//!
//! Every replicated transaction carries a result tag `app.type` naming its
//! kind. Each kind strips a fixed-length prefix from the raw bytes and
//! splits the rest into delimiter-separated segments:
//!
//! | Kind | Prefix | Delimiter | Segments | Used |
//! |------|--------|-----------|----------|------|
//! | `Send` | `trx_send=` | `:` | at least 6 | from, to, amount |
//! | `SetMetering` | `set_mtr=` | `:` (at most 6 pieces) | exactly 6 | dc, ns, value (last) |
//! | `SetBalance` | `set_bal=` | `:` | exactly 5 | address, amount |
//! | `SetStake` | `set_stk=` | `:` | exactly 4 | amount |
//! | `UpdateValidator` | `val:` | `/` | exactly 5 | pubkey, power |

use num_bigint::BigInt;

use super::{
    parse_amount, HistoryError, Metering, SendTx, SetBalanceTx, SetStakeTx, SetValidatorTx,
    TransactionHead, TransactionRecord,
};

/// Result tag key carrying the transaction kind.
pub const TYPE_TAG_KEY: &str = "app.type";

/// Admin account seeded when the service starts.
pub const GENESIS_ADDRESS: &str = "B508ED0D54597D516A680E7951F18CAD24C7EC9FCFCD67";

/// Initial balance of [`GENESIS_ADDRESS`].
pub const GENESIS_BALANCE: &str = "1000000000000000000000000";

/// Transaction kinds the replica understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Send,
    SetMetering,
    SetBalance,
    SetStake,
    UpdateValidator,
}

impl TxKind {
    pub const ALL: [TxKind; 5] = [
        TxKind::Send,
        TxKind::SetMetering,
        TxKind::SetBalance,
        TxKind::SetStake,
        TxKind::UpdateValidator,
    ];

    /// Look up a kind by its `app.type` tag value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Send => "Send",
            Self::SetMetering => "SetMetering",
            Self::SetBalance => "SetBalance",
            Self::SetStake => "SetStake",
            Self::UpdateValidator => "UpdateValidator",
        }
    }

    /// Prefix stripped from the raw transaction before parsing.
    ///
    /// Only its length matters; the bytes themselves are not checked.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Send => "trx_send=",
            Self::SetMetering => "set_mtr=",
            Self::SetBalance => "set_bal=",
            Self::SetStake => "set_stk=",
            Self::UpdateValidator => "val:",
        }
    }

    /// Strip the prefix from `raw` and parse the remaining payload.
    pub fn parse(self, raw: &[u8]) -> Result<TxBody, HistoryError> {
        let body = raw.get(self.prefix().len()..).ok_or(HistoryError::Format {
            tx_type: self.tag(),
            segments: Vec::new(),
        })?;
        self.parse_body(&String::from_utf8_lossy(body))
    }

    /// Parse a payload that already had its prefix removed.
    pub fn parse_body(self, body: &str) -> Result<TxBody, HistoryError> {
        match self {
            Self::Send => {
                let segs = self.segments(body.split(':'), |n| n >= 6)?;
                let amount = parse_amount(self.tag(), &segs[2])?;
                Ok(TxBody::Send {
                    from: segs[0].clone(),
                    to: segs[1].clone(),
                    raw_amount: segs[2].clone(),
                    amount,
                })
            }
            Self::SetMetering => {
                let segs = self.segments(body.splitn(6, ':'), |n| n == 6)?;
                Ok(TxBody::Metering {
                    dc: segs[0].clone(),
                    ns: segs[1].clone(),
                    value: segs[5].clone(),
                })
            }
            Self::SetBalance => {
                let segs = self.segments(body.split(':'), |n| n == 5)?;
                let amount = parse_amount(self.tag(), &segs[1])?;
                Ok(TxBody::SetBalance {
                    address: segs[0].clone(),
                    raw_amount: segs[1].clone(),
                    amount,
                })
            }
            Self::SetStake => {
                let segs = self.segments(body.split(':'), |n| n == 4)?;
                Ok(TxBody::SetStake {
                    amount: segs[0].clone(),
                })
            }
            Self::UpdateValidator => {
                let segs = self.segments(body.split('/'), |n| n == 5)?;
                Ok(TxBody::UpdateValidator {
                    pubkey: segs[0].clone(),
                    power: segs[1].clone(),
                })
            }
        }
    }

    fn segments<'a>(
        self,
        pieces: impl Iterator<Item = &'a str>,
        count_ok: impl Fn(usize) -> bool,
    ) -> Result<Vec<String>, HistoryError> {
        let segments: Vec<String> = pieces.map(str::to_string).collect();
        if count_ok(segments.len()) {
            Ok(segments)
        } else {
            Err(HistoryError::Format {
                tx_type: self.tag(),
                segments,
            })
        }
    }
}

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Debit,
    Credit,
}

/// What a parsed transaction does to the balance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEffect<'a> {
    None,
    /// Additive credit of a single account.
    Credit { address: &'a str, amount: &'a BigInt },
    /// Debit `from`, then credit `to`.
    Transfer {
        from: &'a str,
        to: &'a str,
        amount: &'a BigInt,
    },
}

/// A parsed transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxBody {
    Send {
        from: String,
        to: String,
        amount: BigInt,
        raw_amount: String,
    },
    Metering {
        dc: String,
        ns: String,
        value: String,
    },
    SetBalance {
        address: String,
        amount: BigInt,
        raw_amount: String,
    },
    SetStake {
        amount: String,
    },
    UpdateValidator {
        pubkey: String,
        power: String,
    },
}

impl TxBody {
    pub fn ledger_effect(&self) -> LedgerEffect<'_> {
        match self {
            Self::Send {
                from, to, amount, ..
            } => LedgerEffect::Transfer { from, to, amount },
            Self::SetBalance {
                address, amount, ..
            } => LedgerEffect::Credit { address, amount },
            Self::Metering { .. } | Self::SetStake { .. } | Self::UpdateValidator { .. } => {
                LedgerEffect::None
            }
        }
    }

    /// Build the record persisted for this transaction.
    ///
    /// Amount fields keep the exact text found in the payload.
    pub fn into_record(self, head: TransactionHead) -> TransactionRecord {
        match self {
            Self::Send {
                from,
                to,
                raw_amount,
                ..
            } => TransactionRecord::SendTx(SendTx {
                head,
                from_address: from,
                to_address: to,
                amount: raw_amount,
            }),
            Self::Metering { dc, ns, value } => {
                TransactionRecord::Metering(Metering { head, dc, ns, value })
            }
            Self::SetBalance {
                address,
                raw_amount,
                ..
            } => TransactionRecord::SetBalanceTx(SetBalanceTx {
                head,
                address,
                amount: raw_amount,
            }),
            Self::SetStake { amount } => TransactionRecord::SetStakeTx(SetStakeTx { head, amount }),
            Self::UpdateValidator { pubkey, power } => {
                TransactionRecord::SetValidatorTx(SetValidatorTx {
                    head,
                    validator_pubkey: pubkey,
                    power,
                })
            }
        }
    }
}
