//! Rule Engine Error Types
//!
//! Only the load/persist/command boundary returns these. Parsing, evaluation
//! and statement execution never fail; bad rule text degrades to
//! `Undefined`/false instead.

use thiserror::Error;

/// Result type for rule engine operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Rule engine errors
#[derive(Debug, Error)]
pub enum RuleError {
    /// Channel not found
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Invalid channel or rule definition
    #[error("Invalid definition: {0}")]
    InvalidFormat(String),

    /// Unknown remote command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Store adapter error
    #[error("Store error: {0}")]
    StoreError(#[from] firesense_store::StoreError),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    SchedulerError(String),
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::SerializationError(err.to_string())
    }
}
