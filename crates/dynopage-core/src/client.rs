//! The store client trait request execution is written against.

use async_trait::async_trait;
use dynopage_model::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    DeleteItemInput, DeleteItemOutput, GetItemInput, GetItemOutput, PutItemInput, PutItemOutput,
    QueryInput, QueryOutput, ScanInput, ScanOutput, StoreError, UpdateItemInput, UpdateItemOutput,
};

/// One item-store backend.
///
/// Implementations translate these calls into whatever transport they sit on.
/// All pagination, expression assembly, and retry logic lives above this
/// trait, so an implementation only has to execute single requests.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Read a single item by full primary key.
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError>;

    /// Write a single item, replacing any existing item with the same key.
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError>;

    /// Apply an update expression to a single item.
    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError>;

    /// Delete a single item by full primary key.
    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError>;

    /// Run a key-conditioned query over one partition.
    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError>;

    /// Walk a table or index without a key condition.
    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError>;

    /// Read up to 100 items across tables in one round trip.
    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, StoreError>;

    /// Put or delete up to 25 items across tables in one round trip.
    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, StoreError>;
}
