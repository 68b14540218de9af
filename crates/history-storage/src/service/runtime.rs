//! # History Storage Service
//!
//! Owns the queue between bridge and dispatcher and plugs the replica into
//! the node lifecycle.
//!
//! ```text
//! [Event Bus] ──header/tx──→ [EventBridge] ──queue(100)──→ [TransactionDispatcher]
//!                                                                │
//!                                                   [LedgerReplica] → [HistoryStorage]
//! ```

use async_trait::async_trait;
use history_telemetry::{log_event, register_metrics, QUEUE_DEPTH};
use parking_lot::Mutex;
use shared_bus::{EventPublisher, EventQuery, InMemoryEventBus, SubscriptionError};
use shared_types::{
    EventDataTx, Subsystem, SubsystemError, SubsystemErrorKind, SubsystemStatus,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::open_history_storage;
use crate::config::HistoryDbConfig;
use crate::domain::{Account, HistoryError, StorageError, GENESIS_ADDRESS, GENESIS_BALANCE};
use crate::ports::HistoryStorage;
use crate::service::{EventBridge, TransactionDispatcher};
use crate::LOG_MODULE;

/// Subscriber name on the event bus.
pub const SUBSCRIBER: &str = "HistoryStorageService";

/// Capacity of the bridge to dispatcher queue.
pub const QUEUE_CAPACITY: usize = 100;

pub struct HistoryStorageService {
    bus: Arc<InMemoryEventBus>,
    queue: mpsc::Sender<EventDataTx>,
    bridge: Mutex<Option<JoinHandle<()>>>,
    dispatcher: JoinHandle<()>,
}

impl HistoryStorageService {
    /// Build the service from configuration.
    ///
    /// Returns `Ok(None)` when the configuration disables the replica. A
    /// backend that cannot be opened is fatal.
    pub async fn from_config(
        config: &HistoryDbConfig,
        bus: Arc<InMemoryEventBus>,
    ) -> Result<Option<Self>, HistoryError> {
        let Some(storage) = open_history_storage(config).await? else {
            info!(module = LOG_MODULE, "History database not configured, replica disabled");
            return Ok(None);
        };
        let service = Self::with_storage(storage, bus).await?;
        info!(
            module = LOG_MODULE,
            db_type = %config.db_type,
            db_name = %config.name,
            "History storage service created"
        );
        Ok(Some(service))
    }

    /// Build the service over an already opened backend.
    ///
    /// Seeds the genesis account and starts the dispatcher. Must be called
    /// inside a tokio runtime.
    pub async fn with_storage(
        storage: Arc<dyn HistoryStorage>,
        bus: Arc<InMemoryEventBus>,
    ) -> Result<Self, HistoryError> {
        seed_genesis(storage.as_ref()).await?;
        let dispatcher = TransactionDispatcher::new(Some(storage))
            .with_dead_letter_bus(bus.clone() as Arc<dyn EventPublisher>);
        Ok(Self::with_dispatcher(dispatcher, bus))
    }

    /// Build the service around a configured dispatcher. Nothing is seeded.
    pub fn with_dispatcher(dispatcher: TransactionDispatcher, bus: Arc<InMemoryEventBus>) -> Self {
        if let Err(e) = register_metrics() {
            warn!(module = LOG_MODULE, error = %e, "Metrics registration failed");
        }
        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            bus,
            queue,
            bridge: Mutex::new(None),
            dispatcher: tokio::spawn(dispatcher.run(rx)),
        }
    }

    fn is_bridge_running(&self) -> bool {
        self.bridge
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Insert the genesis account unless it already exists.
pub async fn seed_genesis(storage: &dyn HistoryStorage) -> Result<(), StorageError> {
    if storage.get_account(GENESIS_ADDRESS).await?.is_some() {
        debug!(module = LOG_MODULE, "Genesis account already present");
        return Ok(());
    }
    storage
        .add_account(&Account::new(GENESIS_ADDRESS, GENESIS_BALANCE))
        .await?;
    info!(
        module = LOG_MODULE,
        address = GENESIS_ADDRESS,
        balance = GENESIS_BALANCE,
        "Genesis account seeded"
    );
    Ok(())
}

#[async_trait]
impl Subsystem for HistoryStorageService {
    fn name(&self) -> &'static str {
        SUBSCRIBER
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        let mut bridge = self.bridge.lock();
        if bridge.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SubsystemError::new(
                SUBSCRIBER,
                SubsystemErrorKind::InitializationFailed,
                "already started",
            ));
        }

        let headers = self
            .bus
            .subscribe_unbuffered(SUBSCRIBER, EventQuery::NewBlockHeader);
        let txs = self.bus.subscribe_unbuffered(SUBSCRIBER, EventQuery::Tx);
        let task = EventBridge::new(headers, txs, self.queue.clone());
        *bridge = Some(tokio::spawn(task.run()));

        log_event!(info, LOG_MODULE, "History storage service started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        match self.bus.unsubscribe_all(SUBSCRIBER) {
            Ok(removed) => debug!(module = LOG_MODULE, removed, "Unsubscribed from event bus"),
            Err(SubscriptionError::NotSubscribed(_)) => {
                debug!(module = LOG_MODULE, "Stop requested while not subscribed")
            }
            Err(e) => {
                return Err(SubsystemError::new(
                    SUBSCRIBER,
                    SubsystemErrorKind::ShutdownFailed,
                    e.to_string(),
                ))
            }
        }
        // Queued events are not drained.
        if let Some(handle) = self.bridge.lock().take() {
            handle.abort();
        }
        log_event!(info, LOG_MODULE, "History storage service stopped");
        Ok(())
    }

    async fn health_check(&self) -> SubsystemStatus {
        if self.is_bridge_running() {
            SubsystemStatus::Healthy
        } else {
            SubsystemStatus::Stopped
        }
    }

    fn metrics(&self) -> serde_json::Value {
        serde_json::json!({
            "subsystem": SUBSCRIBER,
            "running": self.is_bridge_running(),
            "queue_depth": QUEUE_DEPTH.get(),
            "queue_capacity": QUEUE_CAPACITY,
        })
    }
}

impl Drop for HistoryStorageService {
    fn drop(&mut self) {
        if let Some(handle) = self.bridge.get_mut().take() {
            handle.abort();
        }
        self.dispatcher.abort();
    }
}
