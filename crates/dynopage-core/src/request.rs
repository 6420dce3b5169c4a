//! Per-operation request state and the auto-paginating executor.
//!
//! A [`Request`] is built fresh for every logical operation: configuration
//! methods consume and return it, and a terminal call (`get`, `insert`,
//! `update`, `delete`, `query`, `scan`, batch ops) consumes it for good.
//! Ownership enforces the operation lifecycle; there is no way to reconfigure
//! or reissue a request after its terminal call.
//!
//! The query path over-fetches past the logical page size, truncates, and
//! synthesizes resumable cursors from the boundary items rather than trusting
//! the store's own continuation key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dynopage_model::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, DeleteRequest, GetItemInput, Item,
    Key, KeysAndAttributes, MAX_BATCH_GET_ITEMS, MAX_BATCH_WRITE_ITEMS, PutItemInput, PutRequest,
    QueryInput, QueryOutput, ReturnValue, ScanInput, ScanOutput, Select, StoreError,
    UpdateItemInput, WriteRequest,
};
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::client::StoreClient;
use crate::codec;
use crate::error::{Error, Result};
use crate::expression::{CREATED_AT, Expressions, UPDATED_AT};
use crate::schema::{ResolvedKeys, Schema};
use crate::time::now_millis;
use crate::value::{Record, Value};

/// Logical page size used when the caller supplies none, or a non-positive
/// one.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Wire-level over-fetch multiplier applied when a filter expression is
/// present, compensating for post-filter attrition.
const FILTER_FETCH_FACTOR: i64 = 4;

// ----- Operation options -----

/// Key values for an equality key condition.
#[derive(Debug, Clone)]
pub struct KeyValues {
    /// Partition key value.
    pub partition: Value,
    /// Sort key value, when the schema (or active global index) has one.
    pub sort: Option<Value>,
    /// Local index sort key value.
    pub local_sort: Option<Value>,
}

impl KeyValues {
    /// Key values conditioning only the partition.
    pub fn new(partition: impl Into<Value>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
            local_sort: None,
        }
    }

    /// Also condition the sort attribute on equality.
    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<Value>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Also condition the local index sort attribute on equality.
    #[must_use]
    pub fn with_local_sort(mut self, sort: impl Into<Value>) -> Self {
        self.local_sort = Some(sort.into());
        self
    }
}

/// How the key condition is supplied.
#[derive(Debug)]
enum KeyCondition {
    Literal(String),
    Values(KeyValues),
}

/// Projection requested by the caller.
#[derive(Debug, Clone)]
pub enum SelectSpec {
    /// A store-native projection mode.
    Mode(Select),
    /// Comma-separated attribute names; key attributes are always added so a
    /// cursor can still be built from the projected items.
    Attributes(String),
}

impl From<Select> for SelectSpec {
    fn from(mode: Select) -> Self {
        Self::Mode(mode)
    }
}

impl From<&str> for SelectSpec {
    fn from(attrs: &str) -> Self {
        Self::Attributes(attrs.to_owned())
    }
}

impl From<String> for SelectSpec {
    fn from(attrs: String) -> Self {
        Self::Attributes(attrs)
    }
}

/// Options for [`Request::insert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOptions {
    /// Drop the duplicate-key guard and overwrite any existing item.
    pub replace: bool,
    /// Keep caller-supplied `createdAt`/`updatedAt` verbatim when both are
    /// present, instead of stamping fresh ones.
    pub preserve_timestamps: bool,
}

/// What [`Request::update`] should write.
#[derive(Debug, Clone)]
pub enum UpdateSpec {
    /// Attributes to assign; the update expression is generated.
    Record(Record),
    /// A literal, fully formed update expression. Passed through untouched,
    /// with no timestamp clause appended.
    Expression(String),
}

/// Options for [`Request::update`].
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Skip the existence guard, creating the item when absent.
    pub upsert: bool,
    /// Attributes assigned only when currently absent.
    pub keep_existing: Vec<String>,
    /// Append the timestamp maintenance clause to generated expressions.
    pub timestamp: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            upsert: false,
            keep_existing: Vec::new(),
            timestamp: true,
        }
    }
}

// ----- Query results -----

/// Bookkeeping accumulated across the wire round trips of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    /// Items returned after truncation to the logical page size.
    pub count: i64,
    /// Items the store examined before filtering.
    pub scanned_count: i64,
    /// Number of wire round trips issued.
    pub iteractions: usize,
    /// Boundary key of the first item of a resumed query, for paging back.
    pub before: Option<Key>,
    /// Boundary key to resume after the last returned item.
    pub after: Option<Key>,
}

/// One logical page of query or scan results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Decoded items, at most the logical page size.
    pub items: Vec<Record>,
    /// Pagination bookkeeping for this page.
    pub stats: QueryStats,
}

// ----- Request -----

/// State for a single store operation.
pub struct Request {
    client: Arc<dyn StoreClient>,
    schema: Schema,
    table: String,
    index: Option<String>,
    select: Option<SelectSpec>,
    limit: i64,
    filter: Option<String>,
    condition: Option<String>,
    key_condition: Option<KeyCondition>,
    forward: bool,
    consistent: Option<bool>,
    return_values: Option<ReturnValue>,
    start_key: Option<Key>,
    exprs: Expressions,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("table", &self.table)
            .field("index", &self.index)
            .field("limit", &self.limit)
            .field("forward", &self.forward)
            .field("filter", &self.filter)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// A fresh operation against `table` under `schema`.
    pub fn new(client: Arc<dyn StoreClient>, schema: Schema, table: impl Into<String>) -> Self {
        Self {
            client,
            schema,
            table: table.into(),
            index: None,
            select: None,
            limit: DEFAULT_PAGE_SIZE,
            filter: None,
            condition: None,
            key_condition: None,
            forward: true,
            consistent: None,
            return_values: None,
            start_key: None,
            exprs: Expressions::new(),
        }
    }

    /// Target a secondary index.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Choose a projection mode or attribute list.
    #[must_use]
    pub fn select(mut self, spec: impl Into<SelectSpec>) -> Self {
        self.select = Some(spec.into());
        self
    }

    /// Set the logical page size. Non-positive values fall back to
    /// [`DEFAULT_PAGE_SIZE`].
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = if limit > 0 { limit } else { DEFAULT_PAGE_SIZE };
        self
    }

    /// Attach a filter expression evaluated by the store after the key scan.
    #[must_use]
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    /// Attach a condition expression gating a write.
    #[must_use]
    pub fn condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = Some(expression.into());
        self
    }

    /// Supply the key condition as a literal expression.
    #[must_use]
    pub fn key_condition(mut self, expression: impl Into<String>) -> Self {
        self.key_condition = Some(KeyCondition::Literal(expression.into()));
        self
    }

    /// Supply the key condition as values; per-attribute equality predicates
    /// are AND-joined against the resolved key attributes.
    #[must_use]
    pub fn key_values(mut self, key: KeyValues) -> Self {
        self.key_condition = Some(KeyCondition::Values(key));
        self
    }

    /// Resume from a boundary key produced by an earlier page.
    #[must_use]
    pub fn resume(mut self, start_key: Key) -> Self {
        self.start_key = Some(start_key);
        self
    }

    /// Request strongly consistent reads.
    #[must_use]
    pub fn consistent(mut self) -> Self {
        self.consistent = Some(true);
        self
    }

    /// Walk the sort order backwards.
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.forward = false;
        self
    }

    /// Choose which item image writes return.
    #[must_use]
    pub fn return_values(mut self, mode: ReturnValue) -> Self {
        self.return_values = Some(mode);
        self
    }

    /// The operation's placeholder maps, for registering names and values
    /// referenced by literal expressions.
    pub fn expressions_mut(&mut self) -> &mut Expressions {
        &mut self.exprs
    }

    // ----- Terminal operations -----

    /// Read one item by its primary key attributes, taken from `key`.
    ///
    /// # Errors
    ///
    /// Fails when `key` lacks a primary key attribute or the store rejects
    /// the request.
    pub async fn get(mut self, key: &Record) -> Result<Option<Record>> {
        let wire_key = self.primary_key_of(key)?;
        let cursor_attrs = self.schema.cursor_attributes(self.index.as_deref())?;
        let (_, projection) = self.build_selection(&cursor_attrs);
        let Self {
            client,
            table,
            consistent,
            exprs,
            ..
        } = self;
        let (names, _) = exprs.into_parts();
        let input = GetItemInput {
            table_name: table,
            key: wire_key,
            consistent_read: consistent,
            projection_expression: projection,
            expression_attribute_names: names,
        };
        let out = client.get_item(input).await?;
        Ok(out.item.map(|item| codec::decode_item(&item)))
    }

    /// Write one item, guarded against overwriting unless
    /// [`InsertOptions::replace`] is set. Returns the item as written,
    /// timestamps included.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::PreconditionFailed`] when the key already exists
    /// and `replace` is not set.
    pub async fn insert(mut self, record: &Record, options: InsertOptions) -> Result<Record> {
        let mut item = record.clone();
        let preserve = options.preserve_timestamps
            && item.contains_key(CREATED_AT)
            && item.contains_key(UPDATED_AT);
        if !preserve {
            let now = now_millis();
            item.insert(CREATED_AT.to_owned(), Value::Num(now));
            item.insert(UPDATED_AT.to_owned(), Value::Num(now));
        }
        let condition = if options.replace {
            self.condition.take()
        } else {
            let guard = self.exprs.attr_not_exists(self.schema.partition());
            Some(match self.condition.take() {
                Some(existing) => format!("{guard} AND ({existing})"),
                None => guard,
            })
        };
        let Self {
            client,
            table,
            return_values,
            exprs,
            ..
        } = self;
        let (names, values) = exprs.into_parts();
        let input = PutItemInput {
            table_name: table,
            item: codec::encode_item(&item),
            condition_expression: condition,
            expression_attribute_names: names,
            expression_attribute_values: values,
            return_values,
        };
        client.put_item(input).await?;
        Ok(item)
    }

    /// Apply an update to the item whose primary key attributes `key`
    /// carries. Returns the written image (all new attributes unless a
    /// different return mode was chosen).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] when `key` lacks a primary key
    /// attribute, and with [`Error::PreconditionFailed`] when the item does
    /// not exist and [`UpdateOptions::upsert`] is not set.
    pub async fn update(
        mut self,
        spec: UpdateSpec,
        key: &Record,
        options: UpdateOptions,
    ) -> Result<Option<Record>> {
        let wire_key = self.primary_key_of(key)?;
        let update_expression = match spec {
            UpdateSpec::Expression(expression) => Some(expression),
            UpdateSpec::Record(record) => {
                let partition = self.schema.partition().to_owned();
                let sort = self.schema.sort().map(ToOwned::to_owned);
                let mut skip = vec![partition.as_str()];
                if let Some(sort) = &sort {
                    skip.push(sort.as_str());
                }
                self.exprs
                    .update(&record, &skip, &options.keep_existing, options.timestamp)
                    .map(|clauses| format!("SET {clauses}"))
            }
        };
        let condition = if options.upsert {
            self.condition.take()
        } else {
            let guard = self.exprs.attr_exists(self.schema.partition());
            Some(match self.condition.take() {
                Some(existing) => format!("{guard} AND ({existing})"),
                None => guard,
            })
        };
        let Self {
            client,
            table,
            return_values,
            exprs,
            ..
        } = self;
        let (names, values) = exprs.into_parts();
        let input = UpdateItemInput {
            table_name: table,
            key: wire_key,
            update_expression,
            condition_expression: condition,
            expression_attribute_names: names,
            expression_attribute_values: values,
            return_values: return_values.or(Some(ReturnValue::AllNew)),
        };
        let out = client.update_item(input).await?;
        Ok(out.attributes.map(|item| codec::decode_item(&item)))
    }

    /// Delete the item whose primary key attributes `key` carries. Returns
    /// the old image, or `None` when nothing was there.
    ///
    /// # Errors
    ///
    /// Fails when `key` lacks a primary key attribute or the store rejects
    /// the request.
    pub async fn delete(mut self, key: &Record) -> Result<Option<Record>> {
        let wire_key = self.primary_key_of(key)?;
        let condition = self.condition.take();
        let Self {
            client,
            table,
            return_values,
            exprs,
            ..
        } = self;
        let (names, values) = exprs.into_parts();
        let input = DeleteItemInput {
            table_name: table,
            key: wire_key,
            condition_expression: condition,
            expression_attribute_names: names,
            expression_attribute_values: values,
            return_values: return_values.or(Some(ReturnValue::AllOld)),
        };
        let out = client.delete_item(input).await?;
        Ok(out.attributes.map(|item| codec::decode_item(&item)))
    }

    /// Run the key-conditioned query loop: over-fetch, truncate to the
    /// logical page size, synthesize cursors, and keep issuing requests
    /// while the store signals more results and the page is not yet full.
    ///
    /// # Errors
    ///
    /// Fails on an unknown index, a sort value without a sort attribute, or
    /// any store-level rejection.
    pub async fn query(mut self) -> Result<QueryPage> {
        let resolved = self.schema.resolve_keys(self.index.as_deref())?;
        let cursor_attrs = self.schema.cursor_attributes(self.index.as_deref())?;
        let key_condition_expression = self.build_key_condition(&resolved)?;
        let (select, projection) = self.build_selection(&cursor_attrs);
        let wire_limit = self.wire_limit();
        let resumed = self.start_key.is_some();
        let logical = self.limit;
        let Self {
            client,
            table,
            index,
            filter,
            consistent,
            forward,
            start_key,
            exprs,
            ..
        } = self;
        let (names, values) = exprs.into_parts();
        let input = QueryInput {
            table_name: table,
            index_name: index,
            key_condition_expression,
            filter_expression: filter,
            projection_expression: projection,
            expression_attribute_names: names,
            expression_attribute_values: values,
            select,
            limit: Some(wire_limit),
            scan_index_forward: Some(forward),
            exclusive_start_key: start_key.unwrap_or_default(),
            consistent_read: consistent,
        };
        paginate(
            client,
            PagedInput::Query(input),
            logical,
            resumed,
            &cursor_attrs,
        )
        .await
    }

    /// Run the same paginating loop without a key condition, walking the
    /// whole table or index.
    ///
    /// # Errors
    ///
    /// Fails on an unknown index or any store-level rejection.
    pub async fn scan(mut self) -> Result<QueryPage> {
        let cursor_attrs = self.schema.cursor_attributes(self.index.as_deref())?;
        let (select, projection) = self.build_selection(&cursor_attrs);
        let wire_limit = self.wire_limit();
        let resumed = self.start_key.is_some();
        let logical = self.limit;
        let Self {
            client,
            table,
            index,
            filter,
            consistent,
            start_key,
            exprs,
            ..
        } = self;
        let (names, values) = exprs.into_parts();
        let input = ScanInput {
            table_name: table,
            index_name: index,
            filter_expression: filter,
            projection_expression: projection,
            expression_attribute_names: names,
            expression_attribute_values: values,
            select,
            limit: Some(wire_limit),
            exclusive_start_key: start_key.unwrap_or_default(),
            consistent_read: consistent,
            segment: None,
            total_segments: None,
        };
        paginate(
            client,
            PagedInput::Scan(input),
            logical,
            resumed,
            &cursor_attrs,
        )
        .await
    }

    /// Scan all segments of the table concurrently and merge the results.
    /// The logical limit applies per segment; cursors are not produced, since
    /// a boundary key is only meaningful within one segment.
    ///
    /// # Errors
    ///
    /// Fails when `total_segments` is not positive, or as [`Request::scan`].
    pub async fn scan_segments(mut self, total_segments: i32) -> Result<QueryPage> {
        if total_segments <= 0 {
            return Err(Error::invalid_argument("total_segments must be positive"));
        }
        let cursor_attrs = self.schema.cursor_attributes(self.index.as_deref())?;
        let (select, projection) = self.build_selection(&cursor_attrs);
        let wire_limit = self.wire_limit();
        let logical = self.limit;
        let Self {
            client,
            table,
            index,
            filter,
            consistent,
            exprs,
            ..
        } = self;
        let (names, values) = exprs.into_parts();
        let base = ScanInput {
            table_name: table,
            index_name: index,
            filter_expression: filter,
            projection_expression: projection,
            expression_attribute_names: names,
            expression_attribute_values: values,
            select,
            limit: Some(wire_limit),
            exclusive_start_key: Key::new(),
            consistent_read: consistent,
            segment: None,
            total_segments: Some(total_segments),
        };
        let segments = (0..total_segments).map(|segment| {
            let mut input = base.clone();
            input.segment = Some(segment);
            paginate(
                Arc::clone(&client),
                PagedInput::Scan(input),
                logical,
                false,
                &cursor_attrs,
            )
        });
        let pages = try_join_all(segments).await?;
        let mut merged = QueryPage::default();
        for page in pages {
            merged.items.extend(page.items);
            merged.stats.count += page.stats.count;
            merged.stats.scanned_count += page.stats.scanned_count;
            merged.stats.iteractions += page.stats.iteractions;
        }
        merged.stats.before = None;
        merged.stats.after = None;
        Ok(merged)
    }

    /// Fetch many items by primary key, in chunks of at most
    /// [`MAX_BATCH_GET_ITEMS`], concatenating results in chunk order.
    /// Unprocessed keys reported by the store are logged and dropped.
    ///
    /// # Errors
    ///
    /// Fails when any record lacks a primary key attribute or any chunk is
    /// rejected.
    pub async fn batch_get(self, records: &[Record]) -> Result<Vec<Record>> {
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(self.primary_key_of(record)?);
        }
        let mut fetched = Vec::new();
        for chunk in keys.chunks(MAX_BATCH_GET_ITEMS) {
            let input = BatchGetItemInput {
                request_items: HashMap::from([(
                    self.table.clone(),
                    KeysAndAttributes {
                        keys: chunk.to_vec(),
                        consistent_read: self.consistent,
                        ..Default::default()
                    },
                )]),
            };
            let out = self.client.batch_get_item(input).await?;
            if let Some(items) = out.responses.get(&self.table) {
                fetched.extend(items.iter().map(codec::decode_item));
            }
            if !out.unprocessed_keys.is_empty() {
                warn!(table = %self.table, "batch get left unprocessed keys behind");
            }
        }
        Ok(fetched)
    }

    /// Delete and put many items, in chunks of at most
    /// [`MAX_BATCH_WRITE_ITEMS`]. All puts of one call share a single
    /// timestamp; `createdAt` is stamped only when absent. Unprocessed
    /// writes reported by the store are logged and dropped.
    ///
    /// # Errors
    ///
    /// Fails when any delete record lacks a primary key attribute or any
    /// chunk is rejected.
    pub async fn batch_write(self, to_delete: &[Record], to_put: &[Record]) -> Result<()> {
        let now = now_millis();
        let mut requests = Vec::with_capacity(to_delete.len() + to_put.len());
        for record in to_delete {
            requests.push(WriteRequest {
                put_request: None,
                delete_request: Some(DeleteRequest {
                    key: self.primary_key_of(record)?,
                }),
            });
        }
        for record in to_put {
            let mut item = record.clone();
            item.entry(CREATED_AT.to_owned()).or_insert(Value::Num(now));
            item.insert(UPDATED_AT.to_owned(), Value::Num(now));
            requests.push(WriteRequest {
                put_request: Some(PutRequest {
                    item: codec::encode_item(&item),
                }),
                delete_request: None,
            });
        }
        for chunk in requests.chunks(MAX_BATCH_WRITE_ITEMS) {
            let input = BatchWriteItemInput {
                request_items: HashMap::from([(self.table.clone(), chunk.to_vec())]),
            };
            let out = self.client.batch_write_item(input).await?;
            if !out.unprocessed_items.is_empty() {
                warn!(table = %self.table, "batch write left unprocessed items behind");
            }
        }
        Ok(())
    }

    // ----- Internals -----

    fn primary_key_of(&self, record: &Record) -> Result<Key> {
        let mut key = Key::new();
        let partition = self.schema.partition();
        let value = record.get(partition).ok_or_else(|| {
            Error::invalid_argument(format!("missing key attribute: {partition}"))
        })?;
        key.insert(partition.to_owned(), codec::encode(value));
        if let Some(sort) = self.schema.sort() {
            let value = record
                .get(sort)
                .ok_or_else(|| Error::invalid_argument(format!("missing key attribute: {sort}")))?;
            key.insert(sort.to_owned(), codec::encode(value));
        }
        Ok(key)
    }

    fn build_key_condition(&mut self, resolved: &ResolvedKeys) -> Result<Option<String>> {
        match self.key_condition.take() {
            None => Ok(None),
            Some(KeyCondition::Literal(expression)) => Ok(Some(expression)),
            Some(KeyCondition::Values(key)) => {
                let mut clauses = Vec::with_capacity(3);
                let name = self.exprs.add_name(&resolved.partition);
                let placeholder = self.exprs.add_value_auto("p", &key.partition);
                clauses.push(format!("{name} = {placeholder}"));
                if let Some(value) = &key.sort {
                    let attr = resolved.sort.as_deref().ok_or_else(|| {
                        Error::invalid_argument("sort value given, but no sort attribute resolved")
                    })?;
                    let name = self.exprs.add_name(attr);
                    let placeholder = self.exprs.add_value_auto("s", value);
                    clauses.push(format!("{name} = {placeholder}"));
                }
                if let Some(value) = &key.local_sort {
                    let attr = resolved.local_sort.as_deref().ok_or_else(|| {
                        Error::invalid_argument(
                            "local sort value given, but the active index is not local",
                        )
                    })?;
                    let name = self.exprs.add_name(attr);
                    let placeholder = self.exprs.add_value_auto("ls", value);
                    clauses.push(format!("{name} = {placeholder}"));
                }
                Ok(Some(clauses.join(" AND ")))
            }
        }
    }

    /// Turn the selection spec into a wire `Select` mode and projection
    /// expression. An attribute list always gains the key attributes of the
    /// active table/index, each token under an ordinal-suffixed placeholder
    /// so caller-registered names cannot collide with it.
    fn build_selection(&mut self, cursor_attrs: &[String]) -> (Option<Select>, Option<String>) {
        match self.select.take() {
            None => (None, None),
            Some(SelectSpec::Mode(mode)) => (Some(mode), None),
            Some(SelectSpec::Attributes(spec)) => {
                let mut tokens: Vec<String> = Vec::new();
                for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    if !tokens.iter().any(|t| t == token) {
                        tokens.push(token.to_owned());
                    }
                }
                for attr in cursor_attrs {
                    if !tokens.iter().any(|t| t == attr) {
                        tokens.push(attr.clone());
                    }
                }
                let placeholders: Vec<String> = tokens
                    .iter()
                    .enumerate()
                    .map(|(i, attr)| self.exprs.add_name_aliased(&format!("{attr}_{i}"), attr))
                    .collect();
                (
                    Some(Select::SpecificAttributes),
                    Some(placeholders.join(", ")),
                )
            }
        }
    }

    fn wire_limit(&self) -> i64 {
        if self.filter.is_some() {
            self.limit * FILTER_FETCH_FACTOR
        } else {
            self.limit + 1
        }
    }
}

// ----- Pagination loop -----

struct PageOut {
    items: Vec<Item>,
    count: i32,
    scanned_count: i32,
    last_evaluated_key: Key,
}

impl From<QueryOutput> for PageOut {
    fn from(out: QueryOutput) -> Self {
        Self {
            items: out.items,
            count: out.count,
            scanned_count: out.scanned_count,
            last_evaluated_key: out.last_evaluated_key,
        }
    }
}

impl From<ScanOutput> for PageOut {
    fn from(out: ScanOutput) -> Self {
        Self {
            items: out.items,
            count: out.count,
            scanned_count: out.scanned_count,
            last_evaluated_key: out.last_evaluated_key,
        }
    }
}

#[derive(Clone)]
enum PagedInput {
    Query(QueryInput),
    Scan(ScanInput),
}

impl PagedInput {
    fn set_start(&mut self, key: Key) {
        match self {
            Self::Query(input) => input.exclusive_start_key = key,
            Self::Scan(input) => input.exclusive_start_key = key,
        }
    }

    async fn dispatch(&self, client: &dyn StoreClient) -> Result<PageOut, StoreError> {
        match self {
            Self::Query(input) => client.query(input.clone()).await.map(PageOut::from),
            Self::Scan(input) => client.scan(input.clone()).await.map(PageOut::from),
        }
    }
}

/// Drive one logical page to completion.
///
/// Issues wire requests until the accumulated count reaches `logical` or the
/// store reports no further results. When the page is cut short of what the
/// store holds, the "after" cursor is synthesized from the last item kept,
/// not from the store's continuation key, which may point past items the
/// truncation discarded. On the first round trip of a resumed run, the first
/// returned item becomes the "before" cursor so the caller can page backward
/// from here.
async fn paginate(
    client: Arc<dyn StoreClient>,
    mut input: PagedInput,
    logical: i64,
    resumed: bool,
    cursor_attrs: &[String],
) -> Result<QueryPage> {
    let mut wire_items: Vec<Item> = Vec::new();
    let mut stats = QueryStats::default();
    loop {
        let page = input.dispatch(client.as_ref()).await?;
        stats.iteractions += 1;
        stats.count += i64::from(page.count);
        stats.scanned_count += i64::from(page.scanned_count);
        debug!(
            round_trips = stats.iteractions,
            page_count = page.count,
            page_scanned = page.scanned_count,
            "page received"
        );
        if resumed && stats.iteractions == 1 {
            if let Some(first) = page.items.first() {
                stats.before = Some(key_from_item(first, cursor_attrs));
            }
        }
        wire_items.extend(page.items);
        let more = !page.last_evaluated_key.is_empty();
        if stats.count >= logical {
            let truncated = wire_items.len() as i64 > logical;
            if truncated {
                wire_items.truncate(logical as usize);
                stats.count = logical;
            }
            if truncated || more {
                if let Some(last) = wire_items.last() {
                    stats.after = Some(key_from_item(last, cursor_attrs));
                }
            }
            break;
        }
        if !more {
            break;
        }
        input.set_start(page.last_evaluated_key);
    }
    Ok(QueryPage {
        items: codec::decode_items(&wire_items),
        stats,
    })
}

/// Project the cursor attributes out of a boundary item.
fn key_from_item(item: &Item, attrs: &[String]) -> Key {
    attrs
        .iter()
        .filter_map(|attr| item.get(attr).map(|value| (attr.clone(), value.clone())))
        .collect()
}
