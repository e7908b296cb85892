//! Periodic event triggers
//!
//! A trigger owns its own scheduling lifecycle; the core only requires
//! idempotent `start`/`stop` and that each fire publishes exactly one
//! timestamped event to the target junction. Any timer or cron facility
//! can sit behind the [`EventTrigger`] trait; [`IntervalTrigger`] is the
//! provided tokio-interval implementation.

use crate::clock::Clock;
use crate::event::StreamEvent;
use crate::junction::StreamJunction;
use rivulet_core::{EngineError, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A schedule-driven generator of synthetic timestamped events.
pub trait EventTrigger: Send + Sync {
    fn name(&self) -> &str;

    /// Begin firing. Idempotent; a second call is a no-op.
    fn start(&self);

    /// Stop firing. Idempotent. Does not touch events already published.
    fn stop(&self);
}

/// Fires at a fixed interval, publishing one event per tick whose single
/// field is the clock's current time in epoch milliseconds.
pub struct IntervalTrigger {
    name: String,
    interval: Duration,
    junction: Arc<StreamJunction>,
    clock: Arc<dyn Clock>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

// the junction and clock behind this trigger are not Debug themselves
impl fmt::Debug for IntervalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalTrigger")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl IntervalTrigger {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        junction: Arc<StreamJunction>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(EngineError::scheduling(
                &name,
                "interval must be positive",
            ));
        }
        Ok(Self {
            name,
            interval,
            junction,
            clock,
            handle: Mutex::new(None),
        })
    }
}

impl EventTrigger for IntervalTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return;
        }

        let name = self.name.clone();
        let interval = self.interval;
        let junction = Arc::clone(&self.junction);
        let clock = Arc::clone(&self.clock);
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the immediate first tick is not a scheduled fire
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = clock.now();
                let event =
                    StreamEvent::new(now, vec![Value::Long(now.timestamp_millis())]);
                debug!(trigger = %name, "trigger fired");
                junction.publish(Arc::new(event)).await;
            }
        }));
    }

    fn stop(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!(trigger = %self.name, "trigger stopped");
        }
    }
}

impl Drop for IntervalTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}
