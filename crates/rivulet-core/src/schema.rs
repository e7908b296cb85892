//! Stream schemas: a name plus an ordered, typed attribute list

use crate::error::EngineError;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Declared type of a stream attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Str,
}

impl AttributeType {
    pub fn name(&self) -> &'static str {
        match self {
            AttributeType::Bool => "bool",
            AttributeType::Int => "int",
            AttributeType::Long => "long",
            AttributeType::Float => "float",
            AttributeType::Double => "double",
            AttributeType::Str => "string",
        }
    }

    /// Whether a value can populate an attribute of this type.
    /// `Null` is accepted for every type (nullable fields).
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (AttributeType::Bool, Value::Bool(_)) => true,
            (AttributeType::Int, Value::Int(_)) => true,
            (AttributeType::Long, Value::Long(_)) => true,
            (AttributeType::Float, Value::Float(_)) => true,
            (AttributeType::Double, Value::Double(_)) => true,
            (AttributeType::Str, Value::Str(_)) => true,
            _ => false,
        }
    }
}

/// One named attribute of a stream schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered schema of a named stream. Fixed for the stream's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSchema {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl StreamSchema {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Validate a field tuple against this schema: exact arity, and each
    /// non-null value must match the declared attribute type.
    pub fn validate(&self, fields: &[Value]) -> Result<(), EngineError> {
        if fields.len() != self.attributes.len() {
            return Err(EngineError::schema_mismatch(
                &self.name,
                format!(
                    "expected {} fields, got {}",
                    self.attributes.len(),
                    fields.len()
                ),
            ));
        }
        for (attr, value) in self.attributes.iter().zip(fields) {
            if !attr.ty.accepts(value) {
                return Err(EngineError::schema_mismatch(
                    &self.name,
                    format!(
                        "attribute '{}' expects {}, got {}",
                        attr.name,
                        attr.ty.name(),
                        value.type_name()
                    ),
                ));
            }
        }
        Ok(())
    }
}
