//! Core error types for dawnlight-core.
//!
//! This module defines the error hierarchy using thiserror. None of these
//! errors are fatal to the alarm loop: the engine logs and degrades instead
//! of propagating them out of a tick.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dawnlight-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Alarm repository errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Device capability errors
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Engine misuse errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alarm repository errors.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Backing store could not be read or written
    #[error("Alarm repository unavailable: {0}")]
    Unavailable(String),

    /// Stored alarm file is malformed
    #[error("Failed to parse alarm store {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// No alarm with the given id
    #[error("Alarm '{0}' not found")]
    NotFound(String),
}

/// Device capability errors.
///
/// Capability failures are downgraded to no-ops by the effector and the
/// fader; they surface only in logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Hardware absent or permission denied
    #[error("{capability} unavailable: {reason}")]
    Unavailable { capability: String, reason: String },

    /// A single device call failed
    #[error("{capability} call failed: {reason}")]
    CallFailed { capability: String, reason: String },
}

impl CapabilityError {
    pub fn unavailable(capability: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.to_string(),
            reason: reason.into(),
        }
    }

    pub fn call_failed(capability: &str, reason: impl Into<String>) -> Self {
        Self::CallFailed {
            capability: capability.to_string(),
            reason: reason.into(),
        }
    }
}

/// Engine-level operation errors. Reported to the caller, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Snooze or dismiss called in a phase where it has no meaning
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A sunrise ramp is already running
    #[error("Sunrise ramp already running; start rejected")]
    ConcurrentStartRejected,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Time of day out of range
    #[error("Invalid time of day {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    /// Repeat day outside 0..=6
    #[error("Repeat day {0} out of range (0 = Sunday .. 6 = Saturday)")]
    RepeatDayOutOfRange(u8),

    /// Repeat day listed twice
    #[error("Repeat day {0} listed more than once")]
    DuplicateRepeatDay(u8),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
