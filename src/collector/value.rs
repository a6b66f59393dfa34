use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed value observed on the factory floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Key used by value maps: strings as-is, numbers and booleans in their display form
    pub fn map_key(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v.min(i64::MAX as u64) as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Type a variable is published as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredType {
    #[serde(alias = "int64", alias = "Int", alias = "int")]
    Int64,
    #[serde(alias = "double", alias = "Float", alias = "float")]
    Double,
    #[serde(alias = "string", alias = "Str", alias = "str")]
    String,
    #[serde(alias = "boolean", alias = "Bool", alias = "bool")]
    Boolean,
}

impl DeclaredType {
    /// Convert a value to this type; `None` when no sensible conversion exists
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (DeclaredType::Int64, Value::Int(i)) => Some(Value::Int(i)),
            (DeclaredType::Int64, Value::Float(f)) if f.is_finite() => {
                Some(Value::Int(f.round() as i64))
            }
            (DeclaredType::Int64, Value::Bool(b)) => Some(Value::Int(b as i64)),
            (DeclaredType::Int64, Value::Str(s)) => s.trim().parse().ok().map(Value::Int),
            (DeclaredType::Double, v) => v.as_f64().filter(|f| f.is_finite()).map(Value::Float),
            (DeclaredType::String, v) => Some(Value::Str(v.to_string())),
            (DeclaredType::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (DeclaredType::Boolean, Value::Int(i)) => Some(Value::Bool(i != 0)),
            (DeclaredType::Boolean, Value::Str(s)) => match s.trim() {
                "true" | "True" | "1" => Some(Value::Bool(true)),
                "false" | "False" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Value used when nothing else is configured
    pub fn zero(&self) -> Value {
        match self {
            DeclaredType::Int64 => Value::Int(0),
            DeclaredType::Double => Value::Float(0.0),
            DeclaredType::String => Value::Str(String::new()),
            DeclaredType::Boolean => Value::Bool(false),
        }
    }
}
