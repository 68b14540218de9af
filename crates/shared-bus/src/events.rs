//! # Node Events
//!
//! Defines the events that flow through the shared bus and the queries
//! subscribers use to select them.

use serde::{Deserialize, Serialize};
use shared_types::entities::{EventDataNewBlockHeader, EventDataTx};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeEvent {
    // =========================================================================
    // CONSENSUS COMMIT EVENTS
    // =========================================================================
    /// A block header was committed. Precedes the block's transactions.
    NewBlockHeader(EventDataNewBlockHeader),

    /// A transaction was committed and executed.
    Tx(EventDataTx),

    // =========================================================================
    // DEAD LETTERS
    // =========================================================================
    /// The history ledger replica was left in a state it cannot repair:
    /// a transfer debited its source but failed to credit its destination.
    LedgerInconsistency {
        /// Hash of the offending transaction.
        tx_hash: String,
        /// Address whose credit failed.
        address: String,
        /// Amount that was debited but never credited.
        amount: String,
        /// Failure description.
        reason: String,
    },
}

impl NodeEvent {
    /// Get the query class this event belongs to.
    #[must_use]
    pub fn query(&self) -> EventQuery {
        match self {
            Self::NewBlockHeader(_) => EventQuery::NewBlockHeader,
            Self::Tx(_) => EventQuery::Tx,
            Self::LedgerInconsistency { .. } => EventQuery::DeadLetter,
        }
    }
}

/// Subscription queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventQuery {
    /// "New block header" notifications.
    NewBlockHeader,
    /// "Transaction committed" notifications.
    Tx,
    /// Dead letters raised by bus-attached services.
    DeadLetter,
    /// All events (no filtering).
    All,
}

impl EventQuery {
    /// Check if an event matches this query.
    #[must_use]
    pub fn matches(&self, event: &NodeEvent) -> bool {
        *self == Self::All || *self == event.query()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::entities::BlockHeader;

    fn header_event() -> NodeEvent {
        NodeEvent::NewBlockHeader(EventDataNewBlockHeader {
            header: BlockHeader::new("test", 1, 0),
        })
    }

    #[test]
    fn test_event_query_mapping() {
        assert_eq!(header_event().query(), EventQuery::NewBlockHeader);

        let tx = NodeEvent::Tx(EventDataTx::new(1, 0, vec![1, 2, 3], vec![]));
        assert_eq!(tx.query(), EventQuery::Tx);
    }

    #[test]
    fn test_query_all_matches_everything() {
        assert!(EventQuery::All.matches(&header_event()));
        let dead = NodeEvent::LedgerInconsistency {
            tx_hash: "AB".into(),
            address: "X".into(),
            amount: "1".into(),
            reason: "boom".into(),
        };
        assert!(EventQuery::All.matches(&dead));
        assert!(EventQuery::DeadLetter.matches(&dead));
    }

    #[test]
    fn test_query_filters_other_classes() {
        assert!(!EventQuery::Tx.matches(&header_event()));
        assert!(!EventQuery::DeadLetter.matches(&header_event()));
    }
}
