//! Event types for the runtime

use chrono::{DateTime, Utc};
use rivulet_core::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A shared reference to an event for cheap passing through pipelines.
/// Windows and emission views hold these instead of cloning field tuples.
pub type SharedEvent = Arc<StreamEvent>;

/// One event on a stream: an ordered, fixed-arity field tuple with a
/// logical timestamp and an expiry flag.
///
/// Events are immutable once published. An expired output is a distinct
/// event carrying the same fields with `is_expired` set; the stored input
/// event is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<Value>,
    #[serde(default)]
    pub is_expired: bool,
}

impl StreamEvent {
    pub fn new(timestamp: DateTime<Utc>, fields: Vec<Value>) -> Self {
        Self {
            timestamp,
            fields,
            is_expired: false,
        }
    }

    pub fn expired(timestamp: DateTime<Utc>, fields: Vec<Value>) -> Self {
        Self {
            timestamp,
            fields,
            is_expired: true,
        }
    }

    pub fn field(&self, idx: usize) -> Option<&Value> {
        self.fields.get(idx)
    }

    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        self.fields.get(idx).and_then(|v| v.as_f64())
    }

    pub fn get_str(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).and_then(|v| v.as_str())
    }
}
