//! Compiled query plans
//!
//! The plan types are the contract between a query compiler and the
//! runtime: stream definitions, window specifications, select lists and
//! trigger definitions. The runtime takes these as already-compiled input;
//! it resolves attribute names against the stream schema when a query is
//! added and rejects invalid window parameters at that point.

use crate::error::EngineError;
use crate::schema::Attribute;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a stream junction delivers published events to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Run every subscriber inline on the publisher's task.
    #[default]
    Sync,
    /// Enqueue into a bounded queue drained by one dedicated worker.
    Async,
}

/// Definition of a named input or output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub name: String,
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub dispatch: DispatchMode,
}

impl StreamDefinition {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            attributes,
            dispatch: DispatchMode::Sync,
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}

/// Window eviction policy and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSpec {
    /// Retain the most recent N events; evict the oldest on overflow.
    SlidingLength(usize),
    /// Accumulate N events, then flush the whole batch at once.
    LengthBatch(usize),
    /// Retain events younger than the duration; evict lazily and on sweep.
    SlidingTime(Duration),
    /// Accumulate for the duration since the first event, then flush.
    TimeBatch(Duration),
}

impl WindowSpec {
    /// Reject non-positive parameters. Runs when the query is built;
    /// a plan that passes here cannot fail at admission time.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            WindowSpec::SlidingLength(0) | WindowSpec::LengthBatch(0) => Err(
                EngineError::WindowPolicy("window length must be positive".into()),
            ),
            WindowSpec::SlidingTime(d) | WindowSpec::TimeBatch(d) if d.is_zero() => Err(
                EngineError::WindowPolicy("window duration must be positive".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// One expression of a query's select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionExpr {
    /// Pass the named attribute of the emission's source event through.
    Attribute(String),
    /// Sum of the named attribute over the emission's window view.
    Sum(String),
    /// Number of events in the emission's window view.
    Count,
}

/// A named output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    pub expr: ProjectionExpr,
}

impl OutputField {
    pub fn new(name: impl Into<String>, expr: ProjectionExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// A compiled standing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub name: String,
    pub input_stream: String,
    /// Attribute names whose value tuple keys the partition; `None` runs
    /// a single unkeyed instance.
    #[serde(default)]
    pub partition_by: Option<Vec<String>>,
    pub window: WindowSpec,
    pub select: Vec<OutputField>,
    pub output_stream: String,
}

/// A periodic trigger that feeds synthetic timestamped events into a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub name: String,
    pub target_stream: String,
    pub interval: Duration,
}
