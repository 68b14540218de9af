//! History database configuration.
//!
//! The replica runs only when a backend type, host and database name are all
//! set. Values come from `QC_HISTORYDB_TYPE`, `QC_HISTORYDB_HOST` and
//! `QC_HISTORYDB_NAME`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    MySql,
    MongoDb,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::MongoDb => "mongodb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Unknown history database type: {0:?} (expected mysql or mongodb)")]
    UnknownBackend(String),

    #[error("Invalid history database name {0:?}: use 1-64 of [A-Za-z0-9_$]")]
    InvalidDatabaseName(String),
}

/// Connection settings of the history store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDbConfig {
    /// `mysql` or `mongodb`, case-insensitive.
    pub db_type: String,
    /// Driver-specific host string, see the adapters.
    pub host: String,
    /// Database (schema) name.
    pub name: String,
}

impl HistoryDbConfig {
    pub fn new(
        db_type: impl Into<String>,
        host: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            db_type: db_type.into(),
            host: host.into(),
            name: name.into(),
        }
    }

    /// Load from environment variables. Unset variables stay empty.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).unwrap_or_default();
        Self {
            db_type: var("QC_HISTORYDB_TYPE"),
            host: var("QC_HISTORYDB_HOST"),
            name: var("QC_HISTORYDB_NAME"),
        }
    }

    /// Selected backend.
    ///
    /// ## Returns
    ///
    /// - `Ok(None)`: any field is empty, the replica stays off
    /// - `Ok(Some(kind))`: a known backend type
    /// - `Err(UnknownBackend)`: anything else
    pub fn backend(&self) -> Result<Option<BackendKind>, ConfigError> {
        if self.db_type.is_empty() || self.host.is_empty() || self.name.is_empty() {
            return Ok(None);
        }
        match self.db_type.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Some(BackendKind::MySql)),
            "mongodb" => Ok(Some(BackendKind::MongoDb)),
            _ => Err(ConfigError::UnknownBackend(self.db_type.clone())),
        }
    }
}

/// Check that a database name is a plain identifier.
///
/// The name ends up inside DDL text, where it cannot be bound as a
/// parameter.
pub fn validate_db_name(name: &str) -> Result<&str, ConfigError> {
    let valid = (1..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
    if valid {
        Ok(name)
    } else {
        Err(ConfigError::InvalidDatabaseName(name.to_string()))
    }
}
