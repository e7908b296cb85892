//! Window operators for stream processing
//!
//! One closed enum covers the four eviction policies:
//! - sliding-length: retain the newest N events, evict the oldest
//! - length-batch: accumulate N events, flush the whole batch
//! - sliding-time: retain events younger than a duration
//! - time-batch: accumulate for a duration since the first event, flush
//!
//! `admit` is the only entry point for events and `sweep` the only entry
//! point for time passing; callers never read or write buffered state.
//! Each [`Emission`] captures the window view its aggregate must be
//! evaluated over, so the aggregator downstream stays a pure function.

use crate::event::SharedEvent;
use chrono::{DateTime, Duration, Utc};
use rivulet_core::{EngineError, WindowSpec};
use std::collections::VecDeque;
use std::sync::Arc;

/// One output of a window mutation: the source event, its role, and the
/// snapshot of window contents the aggregate is computed against.
///
/// For an expired emission the view is the window after that event's own
/// removal (possibly empty); for a current emission it is the window after
/// the admission, or the batch prefix through the event for batch flushes.
#[derive(Debug, Clone)]
pub struct Emission {
    pub event: SharedEvent,
    pub expired: bool,
    pub view: Vec<SharedEvent>,
}

impl Emission {
    fn current(event: SharedEvent, view: Vec<SharedEvent>) -> Self {
        Self {
            event,
            expired: false,
            view,
        }
    }

    fn departed(event: SharedEvent, view: Vec<SharedEvent>) -> Self {
        Self {
            event,
            expired: true,
            view,
        }
    }
}

/// A stateful window buffer implementing one eviction policy.
#[derive(Debug)]
pub enum Window {
    SlidingLength {
        length: usize,
        buffer: VecDeque<SharedEvent>,
    },
    LengthBatch {
        length: usize,
        buffer: Vec<SharedEvent>,
    },
    SlidingTime {
        retention: Duration,
        buffer: VecDeque<SharedEvent>,
    },
    TimeBatch {
        interval: Duration,
        buffer: Vec<SharedEvent>,
    },
}

impl Window {
    /// Build a window from its spec. Non-positive parameters are rejected
    /// here, at query-construction time, never at admission time.
    pub fn new(spec: &WindowSpec) -> Result<Self, EngineError> {
        spec.validate()?;
        match spec {
            WindowSpec::SlidingLength(n) => Ok(Window::SlidingLength {
                length: *n,
                buffer: VecDeque::with_capacity(*n),
            }),
            WindowSpec::LengthBatch(n) => Ok(Window::LengthBatch {
                length: *n,
                buffer: Vec::with_capacity(*n),
            }),
            WindowSpec::SlidingTime(d) => Ok(Window::SlidingTime {
                retention: to_chrono(d)?,
                buffer: VecDeque::new(),
            }),
            WindowSpec::TimeBatch(d) => Ok(Window::TimeBatch {
                interval: to_chrono(d)?,
                buffer: Vec::new(),
            }),
        }
    }

    /// Admit one event, returning the emissions it produced in delivery
    /// order: current events first, then the expired events of the same
    /// admission.
    ///
    /// Time-based eviction runs before the new admission's view is
    /// captured, so a just-expired event never contributes to the current
    /// aggregate.
    pub fn admit(&mut self, event: SharedEvent, now: DateTime<Utc>) -> Vec<Emission> {
        match self {
            Window::SlidingLength { length, buffer } => {
                let mut evicted = Vec::new();
                if buffer.len() >= *length {
                    if let Some(oldest) = buffer.pop_front() {
                        evicted.push(Emission::departed(oldest, snapshot_deque(buffer)));
                    }
                }
                buffer.push_back(Arc::clone(&event));
                let mut out = vec![Emission::current(event, snapshot_deque(buffer))];
                out.extend(evicted);
                out
            }
            Window::LengthBatch { length, buffer } => {
                buffer.push(event);
                if buffer.len() >= *length {
                    flush_batch(std::mem::take(buffer))
                } else {
                    Vec::new()
                }
            }
            Window::SlidingTime { retention, buffer } => {
                let mut out = Vec::new();
                let evicted = evict_aged(buffer, now, *retention);
                buffer.push_back(Arc::clone(&event));
                out.push(Emission::current(event, snapshot_deque(buffer)));
                out.extend(evicted);
                out
            }
            Window::TimeBatch { interval, buffer } => {
                let mut out = Vec::new();
                if batch_elapsed(buffer, now, *interval) {
                    out = flush_batch(std::mem::take(buffer));
                }
                // The triggering event opens the next batch.
                buffer.push(event);
                out
            }
        }
    }

    /// Run time-driven eviction/flushing without admitting an event.
    /// Length-based policies have nothing to do here.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<Emission> {
        match self {
            Window::SlidingTime { retention, buffer } => evict_aged(buffer, now, *retention),
            Window::TimeBatch { interval, buffer } => {
                if batch_elapsed(buffer, now, *interval) {
                    flush_batch(std::mem::take(buffer))
                } else {
                    Vec::new()
                }
            }
            Window::SlidingLength { .. } | Window::LengthBatch { .. } => Vec::new(),
        }
    }

    /// Number of currently buffered events.
    pub fn len(&self) -> usize {
        match self {
            Window::SlidingLength { buffer, .. } | Window::SlidingTime { buffer, .. } => {
                buffer.len()
            }
            Window::LengthBatch { buffer, .. } | Window::TimeBatch { buffer, .. } => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn to_chrono(d: &std::time::Duration) -> Result<Duration, EngineError> {
    Duration::from_std(*d)
        .map_err(|_| EngineError::WindowPolicy(format!("duration {:?} out of range", d)))
}

fn snapshot_deque(buffer: &VecDeque<SharedEvent>) -> Vec<SharedEvent> {
    buffer.iter().map(Arc::clone).collect()
}

/// Evict every event whose age meets the retention bound (inclusive),
/// oldest first. Each expired emission's view is the window after that
/// event's own removal, so successive expiries see a shrinking window
/// down to the empty set.
fn evict_aged(
    buffer: &mut VecDeque<SharedEvent>,
    now: DateTime<Utc>,
    retention: Duration,
) -> Vec<Emission> {
    let mut evicted = Vec::new();
    while let Some(front) = buffer.front() {
        if now - front.timestamp >= retention {
            if let Some(aged) = buffer.pop_front() {
                evicted.push(Emission::departed(aged, snapshot_deque(buffer)));
            }
        } else {
            break;
        }
    }
    evicted
}

fn batch_elapsed(buffer: &[SharedEvent], now: DateTime<Utc>, interval: Duration) -> bool {
    buffer
        .first()
        .is_some_and(|first| now - first.timestamp >= interval)
}

/// Flush a whole batch as current emissions. Each event's view is the
/// batch prefix through itself, giving the running aggregate across the
/// batch; nothing is ever marked expired.
fn flush_batch(batch: Vec<SharedEvent>) -> Vec<Emission> {
    (0..batch.len())
        .map(|i| {
            let view = batch[..=i].to_vec();
            Emission::current(Arc::clone(&batch[i]), view)
        })
        .collect()
}
