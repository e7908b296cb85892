//! Rivulet Core - shared definitions for the Rivulet CEP engine
//!
//! This crate holds the pieces shared between the runtime and anything that
//! produces query plans: the value model, stream schemas, the compiled plan
//! types, and the error taxonomy.

pub mod error;
pub mod plan;
pub mod schema;
pub mod value;

pub use error::{EngineError, Result};
pub use plan::{
    DispatchMode, OutputField, ProjectionExpr, QueryPlan, StreamDefinition, TriggerDefinition,
    WindowSpec,
};
pub use schema::{Attribute, AttributeType, StreamSchema};
pub use value::Value;
