//! # Event Bridge
//!
//! Correlates block headers with the transaction events of their block and
//! feeds the transactions, in commit order, into the dispatcher queue.
//!
//! ```text
//! AwaitingHeader ──header(num_txs > 0)──→ DrainingTxs { remaining: num_txs }
//!       ↑                                         │
//!       └──────────── last tx forwarded ──────────┘
//! ```
//!
//! Both subscriptions are unbuffered and the queue is bounded, so a full
//! queue stalls the bridge, which stalls the publisher.

use history_telemetry::{log_event, metric_inc, EVENTS_RECEIVED, QUEUE_DEPTH};
use shared_bus::{NodeEvent, Subscription};
use shared_types::EventDataTx;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::LOG_MODULE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    AwaitingHeader,
    DrainingTxs { height: i64, remaining: i64 },
}

pub struct EventBridge {
    headers: Subscription,
    txs: Subscription,
    queue: mpsc::Sender<EventDataTx>,
    state: BridgeState,
}

impl EventBridge {
    pub fn new(headers: Subscription, txs: Subscription, queue: mpsc::Sender<EventDataTx>) -> Self {
        Self {
            headers,
            txs,
            queue,
            state: BridgeState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Run until a subscription ends or the queue consumer is gone.
    pub async fn run(mut self) {
        log_event!(info, LOG_MODULE, "Event bridge started");
        while self.step().await {}
        log_event!(info, LOG_MODULE, "Event bridge stopped", state = ?self.state);
    }

    /// Perform one transition. Returns `false` once the bridge must stop.
    pub async fn step(&mut self) -> bool {
        match self.state {
            BridgeState::AwaitingHeader => match self.headers.recv().await {
                Some(NodeEvent::NewBlockHeader(data)) => {
                    metric_inc!(EVENTS_RECEIVED, &["header"]);
                    let header = data.header;
                    debug!(
                        module = LOG_MODULE,
                        height = header.height,
                        num_txs = header.num_txs,
                        "Block header received"
                    );
                    if header.num_txs > 0 {
                        self.state = BridgeState::DrainingTxs {
                            height: header.height,
                            remaining: header.num_txs,
                        };
                    }
                    true
                }
                Some(_) => true,
                None => false,
            },
            BridgeState::DrainingTxs { height, remaining } => match self.txs.recv().await {
                Some(NodeEvent::Tx(tx)) => {
                    metric_inc!(EVENTS_RECEIVED, &["tx"]);
                    if tx.height != height {
                        warn!(
                            module = LOG_MODULE,
                            expected = height,
                            actual = tx.height,
                            index = tx.index,
                            "Transaction event outside the current block"
                        );
                    }
                    let slot = DepthReservation::take();
                    if self.queue.send(tx).await.is_err() {
                        warn!(module = LOG_MODULE, "Transaction queue closed");
                        return false;
                    }
                    slot.commit();
                    self.state = if remaining > 1 {
                        BridgeState::DrainingTxs {
                            height,
                            remaining: remaining - 1,
                        }
                    } else {
                        BridgeState::AwaitingHeader
                    };
                    true
                }
                Some(_) => true,
                None => false,
            },
        }
    }
}

/// One unit of `QUEUE_DEPTH` held while a send is pending. Released on
/// drop unless the event made it into the queue; the dispatcher releases
/// committed units on receive.
struct DepthReservation;

impl DepthReservation {
    fn take() -> Self {
        QUEUE_DEPTH.inc();
        Self
    }

    fn commit(self) {
        std::mem::forget(self);
    }
}

impl Drop for DepthReservation {
    fn drop(&mut self) {
        QUEUE_DEPTH.dec();
    }
}
