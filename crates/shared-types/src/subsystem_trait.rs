//! # Subsystem Trait
//!
//! Lifecycle contract for services that attach to the node's event bus.
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! use shared_types::{Subsystem, SubsystemError, SubsystemStatus};
//! use async_trait::async_trait;
//!
//! pub struct MySubsystem { /* ... */ }
//!
//! #[async_trait]
//! impl Subsystem for MySubsystem {
//!     fn name(&self) -> &'static str { "MySubsystem" }
//!     async fn start(&self) -> Result<(), SubsystemError> { Ok(()) }
//!     async fn stop(&self) -> Result<(), SubsystemError> { Ok(()) }
//!     async fn health_check(&self) -> SubsystemStatus { SubsystemStatus::Healthy }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type for subsystem operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemError {
    /// The subsystem that encountered the error.
    pub subsystem: String,
    /// Error kind.
    pub kind: SubsystemErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl SubsystemError {
    pub fn new(
        subsystem: impl Into<String>,
        kind: SubsystemErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subsystem: subsystem.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SubsystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.subsystem, self.kind, self.message)
    }
}

impl std::error::Error for SubsystemError {}

/// Categories of subsystem errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsystemErrorKind {
    /// Subsystem failed to initialize.
    InitializationFailed,
    /// Subsystem encountered a runtime error.
    RuntimeError,
    /// Subsystem failed to shut down.
    ShutdownFailed,
    /// Configuration error.
    ConfigurationError,
}

impl fmt::Display for SubsystemErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed => write!(f, "InitializationFailed"),
            Self::RuntimeError => write!(f, "RuntimeError"),
            Self::ShutdownFailed => write!(f, "ShutdownFailed"),
            Self::ConfigurationError => write!(f, "ConfigurationError"),
        }
    }
}

/// Health status of a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsystemStatus {
    /// Subsystem is running normally.
    Healthy,
    /// Subsystem is running but degraded.
    Degraded,
    /// Subsystem is not running.
    Stopped,
    /// Subsystem encountered an error.
    Error,
}

/// The lifecycle every bus-attached service implements.
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Get the human-readable name. Also used as the event-bus subscriber key.
    fn name(&self) -> &'static str;

    /// Subscribe to the bus and start background tasks.
    async fn start(&self) -> Result<(), SubsystemError>;

    /// Unsubscribe from the bus.
    async fn stop(&self) -> Result<(), SubsystemError>;

    /// Check the health of the subsystem.
    async fn health_check(&self) -> SubsystemStatus;

    /// Get current metrics for this subsystem.
    fn metrics(&self) -> serde_json::Value {
        serde_json::json!({
            "subsystem": self.name(),
            "status": "no_metrics"
        })
    }
}
