//! Engine error types

use thiserror::Error;

/// Errors raised by the Rivulet engine.
///
/// Per-event conditions (`SchemaMismatch`, `PartitionKey`) are reported to
/// the caller or logged by the owning pipeline and never affect other
/// events or partitions. Construction-time conditions (`WindowPolicy`,
/// `UnknownAttribute`, ...) are fatal to building the query that raised
/// them. `Scheduling` failures are isolated to the trigger and logged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("schema mismatch on stream '{stream}': {reason}")]
    SchemaMismatch { stream: String, reason: String },

    #[error("cannot evaluate partition key on stream '{stream}': {reason}")]
    PartitionKey { stream: String, reason: String },

    #[error("invalid window parameters: {0}")]
    WindowPolicy(String),

    #[error("trigger '{trigger}' scheduling failed: {reason}")]
    Scheduling { trigger: String, reason: String },

    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("stream '{0}' is already defined")]
    DuplicateStream(String),

    #[error("unknown attribute '{attribute}' on stream '{stream}'")]
    UnknownAttribute { stream: String, attribute: String },
}

impl EngineError {
    pub fn schema_mismatch(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::SchemaMismatch {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    pub fn partition_key(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::PartitionKey {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    pub fn scheduling(trigger: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Scheduling {
            trigger: trigger.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
