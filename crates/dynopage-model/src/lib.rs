//! Wire protocol model types for Dynopage.
//!
//! Everything a store client needs to speak the DynamoDB-style JSON protocol:
//! the tagged [`AttributeValue`] union, request/response shapes for the eight
//! item operations, and the wire error vocabulary. The types here carry no
//! behavior beyond (de)serialization; query construction and pagination live
//! in `dynopage-core`.
// "DynamoDB" and tag names like "SS" appear throughout the doc comments.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod output;
pub mod types;

pub use attribute_value::AttributeValue;
pub use error::{StoreError, StoreErrorCode};
pub use input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, PutItemInput,
    QueryInput, ScanInput, UpdateItemInput,
};
pub use output::{
    BatchGetItemOutput, BatchWriteItemOutput, DeleteItemOutput, GetItemOutput, PutItemOutput,
    QueryOutput, ScanOutput, UpdateItemOutput,
};
pub use types::{
    ConsumedCapacity, DeleteRequest, ExpressionAttributeNames, ExpressionAttributeValues, Item,
    Key, KeySchemaElement, KeyType, KeysAndAttributes, MAX_BATCH_GET_ITEMS,
    MAX_BATCH_WRITE_ITEMS, PutRequest, ReturnValue, Select, WriteRequest,
};
