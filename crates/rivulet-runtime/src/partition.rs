//! Per-key partition routing
//!
//! A router owns the lazy key → instance map for one query. Each instance
//! holds its own window; the projector is shared (stateless per call).
//! The owning pipeline serializes all access, so the entry-API insert is
//! atomic with respect to every writer and instance state needs no
//! further locking once routing has occurred.

use crate::aggregation::Projector;
use crate::event::{SharedEvent, StreamEvent};
use crate::window::Window;
use chrono::{DateTime, Utc};
use rivulet_core::{EngineError, Value, WindowSpec};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// One isolated copy of the downstream pipeline, bound to a single key.
struct PartitionInstance {
    window: Window,
}

/// Routes each event to the partition instance matching its key,
/// creating instances lazily, and projects the resulting emissions.
pub struct PartitionRouter {
    stream: String,
    /// Attribute indices whose values form the key; empty = unkeyed.
    key_attrs: Vec<usize>,
    window_spec: WindowSpec,
    projector: Arc<Projector>,
    partitions: FxHashMap<String, PartitionInstance>,
}

impl PartitionRouter {
    pub fn new(
        stream: impl Into<String>,
        key_attrs: Vec<usize>,
        window_spec: WindowSpec,
        projector: Arc<Projector>,
    ) -> Result<Self, EngineError> {
        window_spec.validate()?;
        Ok(Self {
            stream: stream.into(),
            key_attrs,
            window_spec,
            projector,
            partitions: FxHashMap::default(),
        })
    }

    /// Route one event into its partition's window and project the
    /// emissions. A key that cannot be evaluated fails this event only;
    /// no partition state is touched.
    pub fn route(
        &mut self,
        event: SharedEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<StreamEvent>, EngineError> {
        let key = self.partition_key(&event)?;
        let instance = match self.partitions.entry(key) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                debug!(stream = %self.stream, key = %e.key(), "creating partition");
                e.insert(PartitionInstance {
                    window: Window::new(&self.window_spec)?,
                })
            }
        };
        let emissions = instance.window.admit(event, now);
        Ok(emissions
            .iter()
            .map(|em| self.projector.project(em))
            .collect())
    }

    /// Run time-driven eviction across every partition.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        for instance in self.partitions.values_mut() {
            for emission in instance.window.sweep(now) {
                out.push(self.projector.project(&emission));
            }
        }
        out
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Render the key tuple of designated attributes. Missing or null
    /// values make the key unevaluable.
    fn partition_key(&self, event: &SharedEvent) -> Result<String, EngineError> {
        let mut key = String::new();
        for (i, &idx) in self.key_attrs.iter().enumerate() {
            let value = event.field(idx).ok_or_else(|| {
                EngineError::partition_key(&self.stream, format!("missing attribute {}", idx))
            })?;
            match value {
                Value::Null => {
                    return Err(EngineError::partition_key(
                        &self.stream,
                        format!("null value for key attribute {}", idx),
                    ));
                }
                v => {
                    if i > 0 {
                        key.push('\u{1f}');
                    }
                    key.push_str(&v.to_string());
                }
            }
        }
        Ok(key)
    }
}
