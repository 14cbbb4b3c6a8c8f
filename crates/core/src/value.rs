//! Attribute values for Tessera
//!
//! The store only holds strings. This module defines:
//! - Value: what a model hands over for one attribute
//! - BoolPolicy: how `false` is written
//!
//! ## Encoding Rules
//!
//! - `Null` is never written; the field is absent from the hash
//! - `String("")` IS written; an explicitly empty value stays queryable
//! - Integers use their decimal form
//! - Floats always carry a fractional part (`1.0`, never `1`), otherwise
//!   index keys built from them would drift between writers
//! - Booleans are `"true"`/`"false"`, or `false` is omitted under
//!   [`BoolPolicy::OmitFalse`]

use serde::{Deserialize, Serialize};

/// Attribute value as handed over by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unset; omitted from the stored hash
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
}

/// How a `false` boolean is persisted
///
/// Applications have depended on both behaviors, so it is a setting
/// rather than a protocol rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoolPolicy {
    /// Write `"false"`
    #[default]
    String,
    /// Leave the field out of the hash
    OmitFalse,
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical stored form, or `None` when the field must be omitted
    pub fn encode(&self, policy: BoolPolicy) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(false) if policy == BoolPolicy::OmitFalse => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(encode_float(*f)),
            Value::String(s) => Some(s.clone()),
        }
    }
}

fn encode_float(f: f64) -> String {
    let s = f.to_string();
    if f.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        // Identities fit comfortably; larger values keep their decimal text
        i64::try_from(i)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
