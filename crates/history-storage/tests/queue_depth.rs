//! # Queue Depth Gauge
//!
//! `QUEUE_DEPTH` is process-global, so this binary holds a single test and
//! nothing else moves the gauge.

use history_storage::{EventBridge, TransactionDispatcher};
use history_telemetry::QUEUE_DEPTH;
use shared_bus::{EventPublisher, EventQuery, InMemoryEventBus, NodeEvent};
use shared_types::{BlockHeader, EventDataNewBlockHeader, EventDataTx};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn header(height: i64, num_txs: i64) -> NodeEvent {
    NodeEvent::NewBlockHeader(EventDataNewBlockHeader {
        header: BlockHeader::new("depth-test", height, num_txs),
    })
}

fn untagged(height: i64, index: u32) -> NodeEvent {
    NodeEvent::Tx(EventDataTx::new(height, index, vec![index as u8], vec![]))
}

async fn wait_for_depth(expected: i64) {
    timeout(Duration::from_secs(5), async {
        while QUEUE_DEPTH.get() != expected {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("depth stuck at {}, wanted {expected}", QUEUE_DEPTH.get()));
}

#[tokio::test]
async fn test_depth_tracks_queued_events_and_survives_abort() {
    let bus = Arc::new(InMemoryEventBus::new());
    let headers = bus.subscribe_unbuffered("depth", EventQuery::NewBlockHeader);
    let txs = bus.subscribe_unbuffered("depth", EventQuery::Tx);
    let (queue, rx) = mpsc::channel(2);
    let bridge = tokio::spawn(EventBridge::new(headers, txs, queue).run());

    bus.publish(header(1, 3)).await;
    bus.publish(untagged(1, 0)).await;
    bus.publish(untagged(1, 1)).await;
    wait_for_depth(2).await;

    // Queue is full: the bridge now holds the third event in a pending send.
    bus.publish(untagged(1, 2)).await;
    wait_for_depth(3).await;

    bridge.abort();
    assert!(bridge.await.unwrap_err().is_cancelled());
    assert_eq!(QUEUE_DEPTH.get(), 2);

    let dispatcher = tokio::spawn(TransactionDispatcher::new(None).run(rx));
    timeout(Duration::from_secs(5), dispatcher)
        .await
        .expect("dispatcher did not exit")
        .unwrap();
    assert_eq!(QUEUE_DEPTH.get(), 0);
}
