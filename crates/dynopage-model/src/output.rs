//! Response shapes for the eight item operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ConsumedCapacity, Item, Key, WriteRequest};

/// `GetItem` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemOutput {
    /// The requested item, absent when no item matched the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    /// Capacity accounting, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_capacity: Option<ConsumedCapacity>,
}

/// `PutItem` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutItemOutput {
    /// Previous item image, populated per the request's `ReturnValues`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
    /// Capacity accounting, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_capacity: Option<ConsumedCapacity>,
}

/// `UpdateItem` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItemOutput {
    /// Item image, populated per the request's `ReturnValues`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
    /// Capacity accounting, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_capacity: Option<ConsumedCapacity>,
}

/// `DeleteItem` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteItemOutput {
    /// Previous item image, populated per the request's `ReturnValues`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
    /// Capacity accounting, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_capacity: Option<ConsumedCapacity>,
}

/// `Query` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryOutput {
    /// Matched items in key order. Empty for `COUNT` queries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
    /// Number of items returned (post-filter).
    pub count: i32,
    /// Number of items evaluated before filtering.
    pub scanned_count: i32,
    /// Continuation key; present iff the scan stopped before exhausting the
    /// key range.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub last_evaluated_key: Key,
    /// Capacity accounting, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_capacity: Option<ConsumedCapacity>,
}

/// `Scan` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanOutput {
    /// Matched items. Empty for `COUNT` scans.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
    /// Number of items returned (post-filter).
    pub count: i32,
    /// Number of items evaluated before filtering.
    pub scanned_count: i32,
    /// Continuation key; present iff the scan stopped before exhausting the
    /// segment.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub last_evaluated_key: Key,
    /// Capacity accounting, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_capacity: Option<ConsumedCapacity>,
}

/// `BatchGetItem` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchGetItemOutput {
    /// Fetched items, grouped by table.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub responses: HashMap<String, Vec<Item>>,
    /// Keys the store declined to process in this round trip.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub unprocessed_keys: HashMap<String, crate::types::KeysAndAttributes>,
}

/// `BatchWriteItem` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchWriteItemOutput {
    /// Writes the store declined to process in this round trip.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub unprocessed_items: HashMap<String, Vec<WriteRequest>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttributeValue;

    #[test]
    fn test_should_omit_empty_collections() {
        let output = QueryOutput {
            count: 0,
            scanned_count: 0,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&output).unwrap(),
            r#"{"Count":0,"ScannedCount":0}"#
        );
    }

    #[test]
    fn test_should_parse_query_output_with_continuation() {
        let json = r#"{
            "Items": [{"pk": {"S": "a"}}],
            "Count": 1,
            "ScannedCount": 3,
            "LastEvaluatedKey": {"pk": {"S": "a"}}
        }"#;
        let output: QueryOutput = serde_json::from_str(json).unwrap();
        assert_eq!(output.items.len(), 1);
        assert_eq!(output.scanned_count, 3);
        assert_eq!(
            output.last_evaluated_key.get("pk"),
            Some(&AttributeValue::S("a".into()))
        );
    }

    #[test]
    fn test_should_default_missing_item_to_none() {
        let output: GetItemOutput = serde_json::from_str("{}").unwrap();
        assert!(output.item.is_none());
    }
}
