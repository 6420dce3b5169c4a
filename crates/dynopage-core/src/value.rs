//! Native attribute values as application code sees them.

use std::collections::BTreeMap;

use bytes::Bytes;

/// A full application-level item: attribute name to native value.
///
/// A `BTreeMap` rather than a hash map so that generated update expressions
/// enumerate attributes in a stable order.
pub type Record = BTreeMap<String, Value>;

/// A native attribute value.
///
/// Numbers carry float semantics (the wire encodes them as decimal strings).
/// Plain [`Value::List`] values always encode as ordered lists; the two set
/// variants are the only way to produce set-typed wire values, since a bare
/// array of primitives is ambiguous between list and set semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Number with float semantics.
    Num(f64),
    /// UTF-8 string. Empty strings are legal here and remapped by the codec.
    Str(String),
    /// Explicit null.
    Null,
    /// Opaque byte buffer.
    Bytes(Bytes),
    /// Ordered list of nested values.
    List(Vec<Value>),
    /// Nested map of attribute name to value.
    Map(Record),
    /// Homogeneous set of strings.
    StrSet(Vec<String>),
    /// Homogeneous set of numbers.
    NumSet(Vec<f64>),
}

impl Value {
    /// Build a string set from anything yielding string-likes.
    pub fn str_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StrSet(values.into_iter().map(Into::into).collect())
    }

    /// Build a number set.
    pub fn num_set<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Self::NumSet(values.into_iter().collect())
    }

    /// The string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    #[must_use]
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean payload, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The list payload, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// The map payload, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The string-set payload, if this is a string set.
    #[must_use]
    pub fn as_str_set(&self) -> Option<&[String]> {
        match self {
            Self::StrSet(v) => Some(v),
            _ => None,
        }
    }

    /// The number-set payload, if this is a number set.
    #[must_use]
    pub fn as_num_set(&self) -> Option<&[f64]> {
        match self {
            Self::NumSet(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is the explicit null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a scalar a placeholder alias can be derived from
    /// (string, number, or boolean).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Str(_) | Self::Num(_) | Self::Bool(_))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Num(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Num(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Num(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Self::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_convert_primitives() {
        assert_eq!(Value::from(3_i64), Value::Num(3.0));
        assert_eq!(Value::from("x"), Value::Str("x".into()));
        assert_eq!(Value::from(true), Value::Bool(true));
    }

    #[test]
    fn test_should_distinguish_lists_from_sets() {
        let list = Value::List(vec![Value::from("a")]);
        let set = Value::str_set(["a"]);
        assert_ne!(list, set);
        assert!(set.as_str_set().is_some());
        assert!(list.as_list().is_some());
    }

    #[test]
    fn test_should_classify_scalars() {
        assert!(Value::from(1.5).is_scalar());
        assert!(Value::from("s").is_scalar());
        assert!(!Value::Null.is_scalar());
        assert!(!Value::List(vec![]).is_scalar());
    }
}
