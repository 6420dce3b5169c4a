//! The tagged-union wire representation of an attribute value.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single attribute value in the store's wire format.
///
/// Each value serializes as a one-entry JSON object whose key is the type
/// tag: `{"S": "hello"}`, `{"N": "42"}`, `{"BOOL": true}`. Numbers travel as
/// decimal strings (the store does not trust client float encodings), binary
/// payloads travel base64-encoded, and `NULL` carries a literal `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String value. The wire format rejects empty strings; codecs substitute
    /// a sentinel before a value reaches this type.
    S(String),
    /// Number value as a decimal string, e.g. `"3.14"` or `"42"`.
    N(String),
    /// Binary value; base64 text on the wire.
    B(#[serde(with = "base64_bytes")] Bytes),
    /// Set of strings. Unordered; duplicates are rejected by the store.
    SS(Vec<String>),
    /// Set of numbers, each element a decimal string.
    NS(Vec<String>),
    /// Set of binary values.
    BS(#[serde(with = "base64_bytes_seq")] Vec<Bytes>),
    /// Boolean value.
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Null marker. The payload is always `true` on the wire.
    #[serde(rename = "NULL")]
    Null(bool),
    /// Ordered list of nested values.
    L(Vec<AttributeValue>),
    /// Map of attribute name to nested value.
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Null value as it appears on the wire.
    #[must_use]
    pub fn null() -> Self {
        Self::Null(true)
    }

    /// The string payload, if this is an `S` value.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// The raw decimal string payload, if this is an `N` value.
    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// The numeric payload parsed with float semantics, if this is an `N`
    /// value holding a parseable number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// The binary payload, if this is a `B` value.
    #[must_use]
    pub fn as_b(&self) -> Option<&Bytes> {
        match self {
            Self::B(b) => Some(b),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `BOOL` value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this is the `NULL` marker.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// The string-set payload, if this is an `SS` value.
    #[must_use]
    pub fn as_ss(&self) -> Option<&[String]> {
        match self {
            Self::SS(v) => Some(v),
            _ => None,
        }
    }

    /// The number-set payload, if this is an `NS` value.
    #[must_use]
    pub fn as_ns(&self) -> Option<&[String]> {
        match self {
            Self::NS(v) => Some(v),
            _ => None,
        }
    }

    /// The list payload, if this is an `L` value.
    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(v) => Some(v),
            _ => None,
        }
    }

    /// The map payload, if this is an `M` value.
    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this value is one of the three set types.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::SS(_) | Self::NS(_) | Self::BS(_))
    }

    /// The wire tag for this value, e.g. `"S"` or `"BOOL"`. Used in
    /// diagnostics and store-side type checks.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::SS(_) => "SS",
            Self::NS(_) => "NS",
            Self::BS(_) => "BS",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }
}

// Maps have no canonical entry order, so hash entries sorted by key. Every
// other variant hashes its payload directly after the discriminant.
impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::S(s) | Self::N(s) => s.hash(state),
            Self::B(b) => b.hash(state),
            Self::SS(v) | Self::NS(v) => v.hash(state),
            Self::BS(v) => v.hash(state),
            Self::Bool(b) => b.hash(state),
            Self::Null(b) => b.hash(state),
            Self::L(v) => v.hash(state),
            Self::M(m) => {
                let mut entries: Vec<_> = m.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (k, v) in entries {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{s:?}"),
            Self::N(n) => f.write_str(n),
            Self::B(b) => write!(f, "<{} bytes>", b.len()),
            Self::SS(v) => write!(f, "SS{v:?}"),
            Self::NS(v) => write!(f, "NS{v:?}"),
            Self::BS(v) => write!(f, "BS<{} values>", v.len()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null(_) => f.write_str("null"),
            Self::L(v) => {
                f.write_str("[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::M(m) => {
                let mut entries: Vec<_> = m.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                f.write_str("{")?;
                for (i, (k, v)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(&encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_seq {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[Bytes], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&STANDARD.encode(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Bytes>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|value| {
                STANDARD
                    .decode(&value)
                    .map(Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
