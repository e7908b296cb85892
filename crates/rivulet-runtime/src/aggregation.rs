//! Aggregation and projection over window views
//!
//! Aggregates are pure functions of the emission view captured by the
//! window operator; there is no persistent accumulator anywhere, so
//! re-evaluating an unchanged view always yields the identical value and
//! floating-point accumulation order is exactly window-iteration order.

use crate::event::{SharedEvent, StreamEvent};
use crate::window::Emission;
use rivulet_core::{EngineError, OutputField, ProjectionExpr, StreamSchema, Value};
use std::fmt;

/// An aggregation function evaluated against a window view.
pub trait AggregateFunc: Send + Sync {
    /// Function name (e.g. "sum", "count").
    fn name(&self) -> &str;

    /// Compute the aggregate over the view. An empty view yields the
    /// function's identity value, never an error.
    fn apply(&self, view: &[SharedEvent], attr: Option<usize>) -> Value;
}

/// Sum of a numeric attribute. Each stored value is promoted to `f64` at
/// accumulation time; narrow (`f32`) inputs keep their native rounding.
/// Identity: 0.0.
pub struct Sum;

impl AggregateFunc for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn apply(&self, view: &[SharedEvent], attr: Option<usize>) -> Value {
        let idx = attr.unwrap_or(0);
        let total = view
            .iter()
            .filter_map(|e| e.get_f64(idx))
            .fold(0.0f64, |acc, v| acc + v);
        Value::Double(total)
    }
}

/// Number of events in the view. Identity: 0.
pub struct Count;

impl AggregateFunc for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn apply(&self, view: &[SharedEvent], _attr: Option<usize>) -> Value {
        Value::Long(view.len() as i64)
    }
}

enum CompiledExpr {
    Attribute(usize),
    Aggregate {
        func: Box<dyn AggregateFunc>,
        attr: Option<usize>,
    },
}

/// The select list of a query, compiled once against the input schema.
///
/// `project` maps one window emission to one output event: pass-through
/// attributes come from the emission's source event, aggregates from its
/// view, with the expiry flag carried over. Stateless per call.
pub struct Projector {
    fields: Vec<CompiledExpr>,
}

// boxed aggregate functions are not Debug themselves
impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("arity", &self.fields.len())
            .finish()
    }
}

impl Projector {
    pub fn compile(select: &[OutputField], schema: &StreamSchema) -> Result<Self, EngineError> {
        let resolve = |name: &str| {
            schema
                .attribute_index(name)
                .ok_or_else(|| EngineError::UnknownAttribute {
                    stream: schema.name.clone(),
                    attribute: name.to_string(),
                })
        };
        let mut fields = Vec::with_capacity(select.len());
        for field in select {
            let compiled = match &field.expr {
                ProjectionExpr::Attribute(name) => CompiledExpr::Attribute(resolve(name)?),
                ProjectionExpr::Sum(name) => CompiledExpr::Aggregate {
                    func: Box::new(Sum),
                    attr: Some(resolve(name)?),
                },
                ProjectionExpr::Count => CompiledExpr::Aggregate {
                    func: Box::new(Count),
                    attr: None,
                },
            };
            fields.push(compiled);
        }
        Ok(Self { fields })
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn project(&self, emission: &Emission) -> StreamEvent {
        let fields = self
            .fields
            .iter()
            .map(|expr| match expr {
                CompiledExpr::Attribute(idx) => emission
                    .event
                    .field(*idx)
                    .cloned()
                    .unwrap_or(Value::Null),
                CompiledExpr::Aggregate { func, attr } => func.apply(&emission.view, *attr),
            })
            .collect();
        StreamEvent {
            timestamp: emission.event.timestamp,
            fields,
            is_expired: emission.expired,
        }
    }
}
