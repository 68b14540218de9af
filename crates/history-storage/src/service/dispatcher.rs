//! # Transaction Dispatcher
//!
//! Single consumer of the bridge queue. For each committed transaction it
//! reads the `app.type` tag, parses the payload for that kind, applies the
//! ledger effect and appends the record. Failures are logged and counted;
//! the event is never retried.

use history_telemetry::{
    log_event, log_tx_event, metric_inc, time_histogram, EVENTS_DROPPED, EVENT_PROCESSING_DURATION,
    HANDLER_FAILURES, LEDGER_INCONSISTENCIES, QUEUE_DEPTH, RECORDS_PERSISTED,
};
use num_bigint::BigInt;
use shared_bus::{EventPublisher, NodeEvent};
use shared_types::EventDataTx;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::{Sha256TxHasher, SystemClock};
use crate::domain::{
    BalanceChange, HistoryError, LedgerEffect, TransactionHead, TransactionRecord, TxKind,
    TYPE_TAG_KEY,
};
use crate::ports::{HistoryStorage, LedgerReplica, TimeSource, TxHasher};
use crate::service::GlobalLockLedger;
use crate::LOG_MODULE;

struct Backend {
    storage: Arc<dyn HistoryStorage>,
    ledger: Arc<dyn LedgerReplica>,
}

pub struct TransactionDispatcher {
    /// `None` when no backend could be opened; every handler then fails
    /// with `StorageUnavailable`.
    backend: Option<Backend>,
    hasher: Arc<dyn TxHasher>,
    clock: Arc<dyn TimeSource>,
    dead_letters: Option<Arc<dyn EventPublisher>>,
}

impl TransactionDispatcher {
    /// Dispatcher over `storage` with a [`GlobalLockLedger`] in front of it.
    pub fn new(storage: Option<Arc<dyn HistoryStorage>>) -> Self {
        let backend = storage.map(|storage| Backend {
            ledger: Arc::new(GlobalLockLedger::new(storage.clone())),
            storage,
        });
        Self {
            backend,
            hasher: Arc::new(Sha256TxHasher),
            clock: Arc::new(SystemClock),
            dead_letters: None,
        }
    }

    /// Dispatcher with a caller-supplied ledger replica.
    pub fn with_ledger(storage: Arc<dyn HistoryStorage>, ledger: Arc<dyn LedgerReplica>) -> Self {
        Self {
            backend: Some(Backend { storage, ledger }),
            ..Self::new(None)
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn TxHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish `LedgerInconsistency` events on `bus` for half-applied
    /// transfers.
    pub fn with_dead_letter_bus(mut self, bus: Arc<dyn EventPublisher>) -> Self {
        self.dead_letters = Some(bus);
        self
    }

    /// Consume the queue until every sender is gone.
    pub async fn run(self, mut queue: mpsc::Receiver<EventDataTx>) {
        log_event!(info, LOG_MODULE, "Transaction dispatcher started");
        while let Some(event) = queue.recv().await {
            QUEUE_DEPTH.dec();
            // Logged and counted inside; nothing is retried.
            let _ = self.dispatch(&event).await;
        }
        log_event!(info, LOG_MODULE, "Transaction queue closed, dispatcher exiting");
    }

    /// Route one committed transaction.
    ///
    /// ## Returns
    ///
    /// - `Ok(Some(record))`: the record written
    /// - `Ok(None)`: no `app.type` tag, or a tag naming no known kind
    /// - `Err(_)`: the handler failed; nothing was written
    pub async fn dispatch(
        &self,
        event: &EventDataTx,
    ) -> Result<Option<TransactionRecord>, HistoryError> {
        let Some(tag) = event.tag(TYPE_TAG_KEY) else {
            metric_inc!(EVENTS_DROPPED, &["untagged"]);
            debug!(
                module = LOG_MODULE,
                height = event.height,
                index = event.index,
                "Dropping untagged transaction"
            );
            return Ok(None);
        };
        let tag = String::from_utf8_lossy(tag);
        let Some(kind) = TxKind::from_tag(&tag) else {
            metric_inc!(EVENTS_DROPPED, &["unknown_type"]);
            debug!(
                module = LOG_MODULE,
                tx_type = %tag,
                height = event.height,
                "Dropping transaction of unknown type"
            );
            return Ok(None);
        };

        let tx_hash = self.hasher.hash_tx(&event.tx);
        let _timer = time_histogram!(EVENT_PROCESSING_DURATION);

        match self
            .handle(kind, &tx_hash, event.height, event.index, &event.tx)
            .await
        {
            Ok(record) => {
                metric_inc!(RECORDS_PERSISTED, &[record.kind()]);
                log_tx_event!(
                    debug,
                    LOG_MODULE,
                    "Transaction replicated",
                    tx_hash,
                    tx_type = kind.tag(),
                    height = event.height,
                    index = event.index
                );
                Ok(Some(record))
            }
            Err(e) => {
                metric_inc!(HANDLER_FAILURES, &[kind.tag(), e.kind()]);
                log_tx_event!(
                    error,
                    LOG_MODULE,
                    "Transaction handler failed",
                    tx_hash,
                    tx_type = kind.tag(),
                    height = event.height,
                    index = event.index,
                    error = %e
                );
                Err(e)
            }
        }
    }

    /// Parse, apply and persist one transaction of a known kind.
    ///
    /// `raw` still carries the kind's prefix.
    pub async fn handle(
        &self,
        kind: TxKind,
        tx_hash: &str,
        height: i64,
        index: u32,
        raw: &[u8],
    ) -> Result<TransactionRecord, HistoryError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(HistoryError::StorageUnavailable)?;
        let body = kind.parse(raw)?;

        match body.ledger_effect() {
            LedgerEffect::None => {}
            LedgerEffect::Credit { address, amount } => {
                backend.ledger.set_absolute_credit(address, amount).await?;
            }
            LedgerEffect::Transfer { from, to, amount } => {
                backend
                    .ledger
                    .apply_delta(from, amount, BalanceChange::Debit)
                    .await?;
                if let Err(source) = backend
                    .ledger
                    .apply_delta(to, amount, BalanceChange::Credit)
                    .await
                {
                    return Err(self.partial_transfer(tx_hash, from, to, amount, source).await);
                }
            }
        }

        let record = body.into_record(TransactionHead {
            tx_hash: tx_hash.to_string(),
            tx_type: kind.tag().to_string(),
            height,
            index,
            time: self.clock.now(),
        });
        backend.storage.add_transaction_record(&record).await?;
        Ok(record)
    }

    /// The sender was debited but the receiver could not be credited.
    /// Nothing is rolled back.
    async fn partial_transfer(
        &self,
        tx_hash: &str,
        from: &str,
        to: &str,
        amount: &BigInt,
        source: HistoryError,
    ) -> HistoryError {
        metric_inc!(LEDGER_INCONSISTENCIES);
        log_tx_event!(
            error,
            LOG_MODULE,
            "Ledger left inconsistent: debit applied without credit",
            tx_hash,
            from,
            to,
            amount = %amount,
            error = %source
        );

        if let Some(bus) = &self.dead_letters {
            bus.publish(NodeEvent::LedgerInconsistency {
                tx_hash: tx_hash.to_string(),
                address: to.to_string(),
                amount: amount.to_string(),
                reason: source.to_string(),
            })
            .await;
        }

        HistoryError::PartialTransfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: amount.to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryHistoryStore;
    use crate::domain::{Account, StorageError};
    use chrono::{DateTime, TimeZone, Utc};
    use shared_types::KvPair;

    struct FixedClock(DateTime<Utc>);

    impl TimeSource for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct ConstHasher;

    impl TxHasher for ConstHasher {
        fn hash_tx(&self, _tx: &[u8]) -> String {
            "CAFE".to_string()
        }
    }

    fn tagged(kind: &str, tx: &str) -> EventDataTx {
        EventDataTx::new(5, 1, tx.as_bytes(), vec![KvPair::new(TYPE_TAG_KEY, kind)])
    }

    fn dispatcher() -> (Arc<InMemoryHistoryStore>, TransactionDispatcher) {
        let store = Arc::new(InMemoryHistoryStore::new());
        let dispatcher = TransactionDispatcher::new(Some(store.clone() as Arc<dyn HistoryStorage>));
        (store, dispatcher)
    }

    #[tokio::test]
    async fn test_untagged_event_is_dropped() {
        let (store, dispatcher) = dispatcher();
        let event = EventDataTx::new(1, 0, b"trx_send=a:b:1:n:p:s".to_vec(), vec![]);
        assert!(dispatcher.dispatch(&event).await.unwrap().is_none());
        assert!(store.records().is_empty());
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_dropped() {
        let (store, dispatcher) = dispatcher();
        let event = tagged("Mint", "mint=a:1");
        assert!(dispatcher.dispatch(&event).await.unwrap().is_none());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_head_uses_hasher_and_clock() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let store = Arc::new(InMemoryHistoryStore::new());
        let dispatcher = TransactionDispatcher::new(Some(store.clone() as Arc<dyn HistoryStorage>))
            .with_hasher(Arc::new(ConstHasher))
            .with_clock(Arc::new(FixedClock(time)));

        let record = dispatcher
            .dispatch(&tagged("SetStake", "set_stk=100:n:p:s"))
            .await
            .unwrap()
            .unwrap();

        let head = record.head();
        assert_eq!(head.tx_hash, "CAFE");
        assert_eq!(head.tx_type, "SetStake");
        assert_eq!((head.height, head.index), (5, 1));
        assert_eq!(head.time, time);
        assert_eq!(store.record_by_hash("CAFE"), Some(record));
    }

    #[tokio::test]
    async fn test_missing_storage_fails_fast() {
        let dispatcher = TransactionDispatcher::new(None);
        for (kind, tx) in [
            ("Send", "trx_send=a:b:1:n:p:s"),
            ("SetStake", "set_stk=1:n:p:s"),
            ("Send", "bogus"),
        ] {
            let err = dispatcher.dispatch(&tagged(kind, tx)).await.unwrap_err();
            assert!(matches!(err, HistoryError::StorageUnavailable), "{kind} {tx}");
        }
    }

    #[tokio::test]
    async fn test_send_moves_balance() {
        let (store, dispatcher) = dispatcher();
        store.add_account(&Account::new("A", "100")).await.unwrap();

        dispatcher
            .dispatch(&tagged("Send", "trx_send=A:B:30:1:pub:sig"))
            .await
            .unwrap();

        assert_eq!(store.balance_of("A").as_deref(), Some("70"));
        assert_eq!(store.balance_of("B").as_deref(), Some("30"));
    }

    #[tokio::test]
    async fn test_failed_debit_skips_credit_and_record() {
        let (store, dispatcher) = dispatcher();
        let err = dispatcher
            .dispatch(&tagged("Send", "trx_send=GHOST:B:30:1:pub:sig"))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::UnknownSourceAddress { .. }));
        assert_eq!(store.balance_of("B"), None);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_failed_credit_reports_partial_transfer() {
        let (store, dispatcher) = dispatcher();
        store.add_account(&Account::new("A", "100")).await.unwrap();
        store.fail_writes_for("B");
        let before = LEDGER_INCONSISTENCIES.get();

        let err = dispatcher
            .dispatch(&tagged("Send", "trx_send=A:B:30:1:pub:sig"))
            .await
            .unwrap_err();

        match err {
            HistoryError::PartialTransfer {
                from,
                to,
                amount,
                source,
            } => {
                assert_eq!((from.as_str(), to.as_str(), amount.as_str()), ("A", "B", "30"));
                assert!(matches!(
                    *source,
                    HistoryError::Storage(StorageError::Connection(_))
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.balance_of("A").as_deref(), Some("70"));
        assert_eq!(store.balance_of("B"), None);
        assert!(store.records().is_empty());
        assert!(LEDGER_INCONSISTENCIES.get() > before);
    }

    #[tokio::test]
    async fn test_separated_digits_are_rejected_before_the_ledger() {
        let (store, dispatcher) = dispatcher();
        store.add_account(&Account::new("A", "5000")).await.unwrap();

        let err = dispatcher
            .dispatch(&tagged("Send", "trx_send=A:B:1_000:1:p:s"))
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::Amount { tx_type: "Send", .. }));
        assert_eq!(store.balance_of("A").as_deref(), Some("5000"));
        assert_eq!(store.balance_of("B"), None);
        assert!(store.records().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_dispatchers_over_one_store_lose_no_updates() {
        let store = Arc::new(InMemoryHistoryStore::new());
        store.add_account(&Account::new("A", "1000")).await.unwrap();
        let dispatchers = [
            Arc::new(TransactionDispatcher::new(Some(store.clone() as Arc<dyn HistoryStorage>))),
            Arc::new(TransactionDispatcher::new(Some(store.clone() as Arc<dyn HistoryStorage>))),
        ];

        let tasks: Vec<_> = (0..200)
            .map(|nonce| {
                let dispatcher = dispatchers[nonce % 2].clone();
                tokio::spawn(async move {
                    let event = tagged("Send", &format!("trx_send=A:B:1:{nonce}:p:s"));
                    dispatcher.dispatch(&event).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.balance_of("A").as_deref(), Some("800"));
        assert_eq!(store.balance_of("B").as_deref(), Some("200"));
        assert_eq!(store.records().len(), 200);
    }

    #[tokio::test]
    async fn test_format_error_changes_nothing() {
        let (store, dispatcher) = dispatcher();
        store.add_account(&Account::new("A", "100")).await.unwrap();

        let err = dispatcher
            .dispatch(&tagged("Send", "trx_send=A:B:30"))
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::Format { tx_type: "Send", .. }));
        assert_eq!(store.balance_of("A").as_deref(), Some("100"));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_record_write_failure_is_reported() {
        let (store, dispatcher) = dispatcher();
        let event = tagged("SetStake", "set_stk=1:n:p:s");
        dispatcher.dispatch(&event).await.unwrap();

        let err = dispatcher.dispatch(&event).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::Storage(StorageError::DuplicateKey(_))
        ));
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_closed() {
        let (store, dispatcher) = dispatcher();
        let (tx, rx) = mpsc::channel(4);
        let consumer = tokio::spawn(dispatcher.run(rx));

        tx.send(tagged("SetStake", "set_stk=1:n:p:s")).await.unwrap();
        tx.send(tagged("SetMetering", "set_mtr=dc:ns:a:b:c:9")).await.unwrap();
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(5), consumer)
            .await
            .expect("dispatcher did not exit")
            .unwrap();
        assert_eq!(store.records().len(), 2);
    }
}
