//! Runtime value representation.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Fields of a record value, shared between copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordValue {
    /// Record or entity type name.
    pub type_name: String,
    /// Field values in declaration order.
    pub fields: Vec<(String, Value)>,
}

/// Runtime value produced by in-memory evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Record or entity instance.
    Record(Arc<RecordValue>),
    /// Sequence of values.
    Sequence(Arc<Vec<Value>>),
}

impl Value {
    /// Create a record value.
    pub fn record<N: Into<String>>(
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = (N, Value)>,
    ) -> Self {
        Self::Record(Arc::new(RecordValue {
            type_name: type_name.into(),
            fields: fields.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }))
    }

    /// Create a sequence value.
    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Sequence(Arc::new(items.into_iter().collect()))
    }

    /// Check if this value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as boolean.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub const fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the elements of a sequence.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a record field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(record) => record
                .fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Total order used for sorting: nulls first, numbers by value, then
    /// strings, booleans and records by their fields.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Record(a), Self::Record(b)) => a
                .fields
                .iter()
                .zip(&b.fields)
                .map(|((_, x), (_, y))| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal),
            (Self::Sequence(a), Self::Sequence(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (a, b) => match (a.as_float64(), b.as_float64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int64(_) | Self::Float64(_) => 2,
            Self::String(_) => 3,
            Self::Record(_) => 4,
            Self::Sequence(_) => 5,
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int64(_) => "Int64",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Record(record) => &record.type_name,
            Self::Sequence(_) => "Sequence",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Record(record) => {
                let fields = record
                    .fields
                    .iter()
                    .map(|(n, v)| format!("{n} = {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{} {{ {fields} }}", record.type_name)
            }
            Self::Sequence(items) => {
                let items = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{items}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i64).as_int64(), Some(42));
        assert_eq!(Value::from(2.5f64).as_float64(), Some(2.5));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_record_fields() {
        let order = Value::record("Order", [("Id", Value::Int64(7)), ("Amount", 2.5.into())]);

        assert_eq!(order.field("Id"), Some(&Value::Int64(7)));
        assert_eq!(order.field("Missing"), None);
        assert_eq!(order.type_name(), "Order");
        assert_eq!(order.to_string(), "Order { Id = 7, Amount = 2.5 }");
    }

    #[test]
    fn test_total_cmp() {
        assert_eq!(Value::Null.total_cmp(&Value::Int64(1)), Ordering::Less);
        assert_eq!(Value::Int64(2).total_cmp(&Value::Float64(1.5)), Ordering::Greater);
        assert_eq!(
            Value::from("a").total_cmp(&Value::from("b")),
            Ordering::Less
        );

        let a = Value::record("Pair", [("x", Value::Int64(1)), ("y", Value::Int64(2))]);
        let b = Value::record("Pair", [("x", Value::Int64(1)), ("y", Value::Int64(3))]);
        assert_eq!(a.total_cmp(&b), Ordering::Less);
    }
}
