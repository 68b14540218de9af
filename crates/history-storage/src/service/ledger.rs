//! Balance read-modify-write behind one process-wide lock.

use async_trait::async_trait;
use num_bigint::BigInt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::domain::{parse_balance, Account, BalanceChange, HistoryError};
use crate::ports::{HistoryStorage, LedgerReplica};
use crate::LOG_MODULE;

/// Shared by every `GlobalLockLedger` in the process.
static BALANCE_LOCK: Mutex<()> = Mutex::const_new(());

/// `LedgerReplica` serializing every balance mutation, whatever the
/// address or ledger instance, through [`BALANCE_LOCK`].
pub struct GlobalLockLedger {
    storage: Arc<dyn HistoryStorage>,
}

impl GlobalLockLedger {
    pub fn new(storage: Arc<dyn HistoryStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl LedgerReplica for GlobalLockLedger {
    async fn apply_delta(
        &self,
        address: &str,
        amount: &BigInt,
        change: BalanceChange,
    ) -> Result<(), HistoryError> {
        let _guard = BALANCE_LOCK.lock().await;

        let Some(account) = self.storage.get_account(address).await? else {
            return match change {
                BalanceChange::Debit => {
                    error!(module = LOG_MODULE, address, "Debit of unknown source address");
                    Err(HistoryError::UnknownSourceAddress {
                        address: address.to_string(),
                    })
                }
                BalanceChange::Credit => {
                    debug!(module = LOG_MODULE, address, amount = %amount, "Creating account");
                    self.storage
                        .add_account(&Account::new(address, amount.to_string()))
                        .await?;
                    Ok(())
                }
            };
        };

        let current = parse_balance(&account.address, &account.balance)?;
        let next = match change {
            BalanceChange::Debit => current - amount,
            BalanceChange::Credit => current + amount,
        };
        self.storage
            .update_account_balance(address, &next.to_string())
            .await?;
        Ok(())
    }
}
