//! Runtime values
//!
//! Bodies and advice exchange a small dynamic value type. The engine never
//! inspects values beyond passing them along; object references exist so
//! that the classifier can tell whether a call lands on the caller's own
//! instance and so that dispatch can find the receiver's runtime type.

use crate::registry::TypeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a live object: an instance id plus its runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Instance id, unique per weaver
    pub id: u64,
    /// Runtime (most derived) type of the instance
    pub ty: TypeId,
}

impl ObjectRef {
    /// Create a new object reference
    pub fn new(id: u64, ty: TypeId) -> Self {
        Self { id, ty }
    }
}

/// A runtime value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value (also the result of a body that falls off its end)
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// String
    Str(String),
    /// Object reference
    Object(ObjectRef),
}

impl Value {
    /// Parse a command-line style literal: `null`, `true`/`false`, integers,
    /// floats, and anything else as a string.
    pub fn parse_literal(text: &str) -> Value {
        match text {
            "null" => Value::Null,
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                if let Ok(i) = text.parse::<i64>() {
                    Value::Int(i)
                } else if let Ok(f) = text.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::Str(text.to_string())
                }
            }
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(o) => Some(*o),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Object(o) => write!(f, "object#{}", o.id),
        }
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

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal("null"), Value::Null);
        assert_eq!(Value::parse_literal("true"), Value::Bool(true));
        assert_eq!(Value::parse_literal("-7"), Value::Int(-7));
        assert_eq!(Value::parse_literal("2.5"), Value::Float(2.5));
        assert_eq!(Value::parse_literal("abc"), Value::Str("abc".to_string()));
    }

    #[test]
    fn test_untagged_json() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(1.5),
                Value::Str("x".to_string())
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(4).to_string(), "4");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(Value::Object(ObjectRef::new(9, TypeId::from_index(0))).to_string(), "object#9");
    }
}
