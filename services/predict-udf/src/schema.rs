//! Input schema of a resolved model and the typed values bound against it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Column types the pipeline runtime accepts as model inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    /// 32-bit signed integer. Declared `long` inputs narrow to this.
    Int,
}

impl FieldType {
    /// Map a signature's declared type. `None` for anything outside the
    /// supported set.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared {
            "string" => Some(FieldType::String),
            "integer" | "long" => Some(FieldType::Int),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Int => f.write_str("int"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self { Self { name: name.into(), ty } }
}

/// Ordered input fields of a model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self { Self { fields } }
    pub fn fields(&self) -> &[Field] { &self.fields }
    pub fn len(&self) -> usize { self.fields.len() }
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
    pub fn names(&self) -> Vec<String> { self.fields.iter().map(|f| f.name.clone()).collect() }

    /// Bind positional parameters to this schema, producing a single row.
    ///
    /// Count, type and range are checked before anything reaches the
    /// pipeline; nothing is coerced.
    pub fn bind(&self, params: &[Param]) -> Result<Vec<Value>, BindError> {
        if params.len() != self.fields.len() {
            return Err(BindError::Arity { expected: self.fields.len(), got: params.len() });
        }
        self.fields
            .iter()
            .zip(params)
            .map(|(field, param)| match (field.ty, param) {
                (FieldType::String, Param::Str(s)) => Ok(Value::Str(s.clone())),
                (FieldType::Int, Param::Int(v)) => i32::try_from(*v)
                    .map(Value::Int)
                    .map_err(|_| BindError::OutOfRange { field: field.name.clone(), value: *v }),
                (expected, other) => Err(BindError::ParamType { field: field.name.clone(), expected, got: other.type_name() }),
            })
            .collect()
    }
}

/// A caller-supplied feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Int(i64),
    Str(String),
}

impl Param {
    pub fn type_name(&self) -> &'static str {
        match self {
            Param::Int(_) => "int",
            Param::Str(_) => "string",
        }
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self { Param::Str(v.to_string()) }
}

impl From<String> for Param {
    fn from(v: String) -> Self { Param::Str(v) }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self { Param::Int(v) }
}

#[derive(Debug, Error, PartialEq)]
pub enum BindError {
    #[error("expected {expected} parameters, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("parameter {field} expects {expected}, got {got}")]
    ParamType { field: String, expected: FieldType, got: &'static str },
    #[error("parameter {field} value {value} does not fit in a 32-bit int")]
    OutOfRange { field: String, value: i64 },
}

/// A cell in a frame flowing through a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i32),
    Double(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Vector(_) => "vector",
        }
    }

    /// Numeric view for scalar columns.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Vector(vs) => {
                f.write_str("[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}
