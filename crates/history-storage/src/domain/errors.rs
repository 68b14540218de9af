use thiserror::Error;

/// Failures of a storage backend call.
///
/// Adapters map their driver errors onto these variants; nothing is
/// retried inside an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

/// Failures of handling one committed transaction.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid {tx_type} payload: {segments:?}")]
    Format {
        tx_type: &'static str,
        segments: Vec<String>,
    },

    #[error("Invalid {tx_type} amount: {value:?}")]
    Amount { tx_type: &'static str, value: String },

    #[error("Unknown source address: {address}")]
    UnknownSourceAddress { address: String },

    #[error("History storage is not initialized")]
    StorageUnavailable,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Transfer of {amount} from {from} debited but not credited to {to}")]
    PartialTransfer {
        from: String,
        to: String,
        amount: String,
        source: Box<HistoryError>,
    },
}

impl HistoryError {
    /// Short error kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format { .. } => "format",
            Self::Amount { .. } => "amount",
            Self::UnknownSourceAddress { .. } => "unknown_source",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Storage(StorageError::DuplicateKey(_)) => "duplicate_key",
            Self::Storage(_) => "storage",
            Self::PartialTransfer { .. } => "partial_transfer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_partial_transfer_exposes_source() {
        let err = HistoryError::PartialTransfer {
            from: "A".into(),
            to: "B".into(),
            amount: "5".into(),
            source: Box::new(HistoryError::Storage(StorageError::Connection("down".into()))),
        };
        assert_eq!(err.kind(), "partial_transfer");
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Transfer of 5 from A debited but not credited to B"
        );
    }

    #[test]
    fn test_storage_error_kinds() {
        let dup: HistoryError = StorageError::DuplicateKey("h".into()).into();
        assert_eq!(dup.kind(), "duplicate_key");
        let other: HistoryError = StorageError::Query("q".into()).into();
        assert_eq!(other.kind(), "storage");
    }

    #[test]
    fn test_format_error_lists_segments() {
        let err = HistoryError::Format {
            tx_type: "Send",
            segments: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), r#"Invalid Send payload: ["a", "b"]"#);
    }
}
