//! Output delivery to registered consumers

use crate::event::StreamEvent;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A consumer callback receiving finished event batches.
pub type StreamCallback = Box<dyn Fn(&[StreamEvent]) + Send + Sync>;

/// Delivers each batch produced by one window mutation to every registered
/// callback exactly once. The callback list is mutex-held, so no consumer
/// is ever invoked concurrently with itself and batch order is preserved.
pub struct OutputDispatcher {
    stream: String,
    callbacks: Mutex<Vec<StreamCallback>>,
}

impl OutputDispatcher {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn register(&self, callback: StreamCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Deliver one batch: current events first, then the expired events of
    /// the same admission, exactly as produced upstream. Empty batches are
    /// skipped.
    pub fn deliver(&self, events: &[StreamEvent]) {
        if events.is_empty() {
            return;
        }
        debug!(stream = %self.stream, count = events.len(), "delivering batch");
        let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.iter() {
            callback(events);
        }
    }
}
