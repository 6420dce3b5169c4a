//! Shared wire types: enums, key schema elements, and batch shapes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AttributeValue;

/// A full item: attribute name to wire value.
pub type Item = HashMap<String, AttributeValue>;

/// A primary key: the partition (and optional sort) attribute values.
pub type Key = HashMap<String, AttributeValue>;

/// Substitution map from `#placeholder` to attribute name.
pub type ExpressionAttributeNames = HashMap<String, String>;

/// Substitution map from `:placeholder` to wire value.
pub type ExpressionAttributeValues = HashMap<String, AttributeValue>;

/// Maximum number of keys in one batch-get request.
pub const MAX_BATCH_GET_ITEMS: usize = 100;

/// Maximum number of write requests in one batch-write request.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

// ---------------------------------------------------------------------------
// Key schema
// ---------------------------------------------------------------------------

/// Role of a key attribute within a table or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// Partition (hash) key.
    #[serde(rename = "HASH")]
    Hash,
    /// Sort (range) key.
    #[serde(rename = "RANGE")]
    Range,
}

impl KeyType {
    /// Wire string for this key role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "HASH",
            Self::Range => "RANGE",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a table's or index's key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    /// Name of the key attribute.
    pub attribute_name: String,
    /// Whether the attribute is the partition or the sort key.
    pub key_type: KeyType,
}

impl KeySchemaElement {
    /// Convenience constructor.
    #[must_use]
    pub fn new(attribute_name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            key_type,
        }
    }
}

// ---------------------------------------------------------------------------
// Query options
// ---------------------------------------------------------------------------

/// Projection mode for query and scan requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Select {
    /// Return every attribute of each matched item.
    #[serde(rename = "ALL_ATTRIBUTES")]
    AllAttributes,
    /// Return every attribute projected into the queried index.
    #[serde(rename = "ALL_PROJECTED_ATTRIBUTES")]
    AllProjectedAttributes,
    /// Return only the attributes named by the projection expression.
    #[serde(rename = "SPECIFIC_ATTRIBUTES")]
    SpecificAttributes,
    /// Return only the count of matched items.
    #[serde(rename = "COUNT")]
    Count,
}

impl Select {
    /// Wire string for this projection mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllAttributes => "ALL_ATTRIBUTES",
            Self::AllProjectedAttributes => "ALL_PROJECTED_ATTRIBUTES",
            Self::SpecificAttributes => "SPECIFIC_ATTRIBUTES",
            Self::Count => "COUNT",
        }
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which item image a write operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnValue {
    /// Return nothing (the default for most writes).
    #[serde(rename = "NONE")]
    None,
    /// Return the full item as it was before the write.
    #[serde(rename = "ALL_OLD")]
    AllOld,
    /// Return only the updated attributes, pre-write values.
    #[serde(rename = "UPDATED_OLD")]
    UpdatedOld,
    /// Return the full item as it is after the write.
    #[serde(rename = "ALL_NEW")]
    AllNew,
    /// Return only the updated attributes, post-write values.
    #[serde(rename = "UPDATED_NEW")]
    UpdatedNew,
}

impl ReturnValue {
    /// Wire string for this return-values mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AllOld => "ALL_OLD",
            Self::UpdatedOld => "UPDATED_OLD",
            Self::AllNew => "ALL_NEW",
            Self::UpdatedNew => "UPDATED_NEW",
        }
    }
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity units consumed by a request, echoed back when requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConsumedCapacity {
    /// Table the capacity was consumed against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Total capacity units consumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_units: Option<f64>,
}

// ---------------------------------------------------------------------------
// Batch shapes
// ---------------------------------------------------------------------------

/// Per-table request block inside a batch get.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeysAndAttributes {
    /// Primary keys to fetch.
    pub keys: Vec<Key>,
    /// Optional projection applied to every fetched item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
    /// Name substitutions for the projection expression.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_names: ExpressionAttributeNames,
    /// Strongly consistent read flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}

/// One element of a batch write: exactly one of put or delete.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteRequest {
    /// Item to put, when this element is an insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_request: Option<PutRequest>,
    /// Key to delete, when this element is a deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_request: Option<DeleteRequest>,
}

/// Put half of a [`WriteRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRequest {
    /// The full item to store.
    pub item: Item,
}

/// Delete half of a [`WriteRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRequest {
    /// Primary key of the item to remove.
    pub key: Key,
}
