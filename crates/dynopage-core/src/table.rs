//! Schema-bound CRUD facade.
//!
//! A [`Table`] binds a store client to one table's key schema and exposes
//! semantically named operations on top of the request engine: paginated
//! fetches with opaque cursor tokens, guarded inserts, generated updates,
//! list and set mutations, and bulk utilities. Every operation builds a
//! fresh [`Request`] underneath.

use std::fmt;
use std::sync::Arc;

use dynopage_model::Select;
use tracing::debug;
use uuid::Uuid;

use crate::client::StoreClient;
use crate::cursor;
use crate::error::{Error, Result};
use crate::expression::{Expressions, UPDATED_AT};
use crate::request::{InsertOptions, QueryPage, Request, UpdateOptions, UpdateSpec};
use crate::schema::Schema;
use crate::time::now_millis;
use crate::value::{Record, Value};

/// Cursor token naming the position before the first item.
pub const CURSOR_FIRST: &str = "first";
/// Cursor token naming the position after the last item.
pub const CURSOR_LAST: &str = "last";

/// Page size used internally by [`Table::clear`].
const CLEAR_PAGE_SIZE: i64 = 250;

// ----- Hooks -----

/// Which write operation a hook is observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// A guarded or replacing put.
    Insert,
    /// An update-expression write, including list and set mutations.
    Update,
    /// A delete.
    Delete,
}

/// In-progress write state handed to a [`WriteHook`].
///
/// The hook may register additional placeholders through `expressions` and
/// may replace the generated expressions wholesale by returning an override.
pub struct HookContext<'a> {
    /// The operation being built.
    pub operation: WriteKind,
    /// Target table name.
    pub table: &'a str,
    /// Partition key attribute of the table.
    pub partition_attr: &'a str,
    /// Sort key attribute of the table, if any.
    pub sort_attr: Option<&'a str>,
    /// The operation's placeholder maps.
    pub expressions: &'a mut Expressions,
    /// The update expression generated so far, if the operation has one.
    pub update_expression: Option<&'a str>,
    /// The condition expression attached so far, if any.
    pub condition_expression: Option<&'a str>,
}

impl fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("operation", &self.operation)
            .field("table", &self.table)
            .field("update_expression", &self.update_expression)
            .field("condition_expression", &self.condition_expression)
            .finish_non_exhaustive()
    }
}

/// Replacement expressions returned by a hook. `None` fields keep the
/// generated ones.
#[derive(Debug, Clone, Default)]
pub struct HookOverride {
    /// Replaces the generated update expression.
    pub update_expression: Option<String>,
    /// Replaces the attached condition expression.
    pub condition_expression: Option<String>,
}

/// Callback observing every write before it is issued.
pub type WriteHook = Arc<dyn Fn(&mut HookContext<'_>) -> Option<HookOverride> + Send + Sync>;

// ----- Table -----

/// A store client bound to one table and its key schema.
#[derive(Clone)]
pub struct Table {
    client: Arc<dyn StoreClient>,
    name: String,
    schema: Schema,
    hook: Option<WriteHook>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("hook", &self.hook.as_ref().map(|_| "set"))
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Table`], failing at build time when a dependency is
/// missing.
#[derive(Default)]
pub struct TableBuilder {
    client: Option<Arc<dyn StoreClient>>,
    name: Option<String>,
    schema: Option<Schema>,
    hook: Option<WriteHook>,
}

impl fmt::Debug for TableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableBuilder")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl TableBuilder {
    /// Supply the store client.
    #[must_use]
    pub fn client(mut self, client: Arc<dyn StoreClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Supply the table name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Supply the key schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Install a write hook.
    #[must_use]
    pub fn hook(mut self, hook: WriteHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Build the table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the client, name, or schema is
    /// missing.
    pub fn build(self) -> Result<Table> {
        Ok(Table {
            client: self
                .client
                .ok_or_else(|| Error::configuration("no store client supplied"))?,
            name: self
                .name
                .ok_or_else(|| Error::configuration("no table name supplied"))?,
            schema: self
                .schema
                .ok_or_else(|| Error::configuration("no schema supplied"))?,
            hook: self.hook,
        })
    }
}

impl Table {
    /// Start assembling a table binding.
    #[must_use]
    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    /// The bound table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound key schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn request(&self) -> Request {
        Request::new(Arc::clone(&self.client), self.schema.clone(), self.name.clone())
    }

    fn key_attrs(&self) -> Vec<&str> {
        let mut attrs = vec![self.schema.partition()];
        if let Some(sort) = self.schema.sort() {
            attrs.push(sort);
        }
        attrs
    }

    fn apply_hook(
        &self,
        operation: WriteKind,
        request: &mut Request,
        update_expression: &mut Option<String>,
        condition_expression: &mut Option<String>,
    ) {
        let Some(hook) = &self.hook else { return };
        let mut ctx = HookContext {
            operation,
            table: &self.name,
            partition_attr: self.schema.partition(),
            sort_attr: self.schema.sort(),
            expressions: request.expressions_mut(),
            update_expression: update_expression.as_deref(),
            condition_expression: condition_expression.as_deref(),
        };
        if let Some(overrides) = hook(&mut ctx) {
            if let Some(expression) = overrides.update_expression {
                *update_expression = Some(expression);
            }
            if let Some(expression) = overrides.condition_expression {
                *condition_expression = Some(expression);
            }
        }
    }

    // ----- Reads -----

    /// Start a paginated fetch of the items under one partition value.
    #[must_use]
    pub fn fetch(&self, partition: impl Into<Value>) -> Fetch<'_> {
        Fetch {
            table: self,
            partition: partition.into(),
            sort: None,
            index: None,
            exact: false,
            limit: None,
            consistent: false,
            desc: false,
            select: None,
            attributes: None,
            after: None,
            before: None,
            resume: None,
            filter: None,
            item_selector: None,
            reducer: None,
        }
    }

    /// Read one item by its primary key attributes, taken from `key`.
    ///
    /// # Errors
    ///
    /// Fails when `key` lacks a primary key attribute or the store rejects
    /// the request.
    pub async fn get(&self, key: &Record) -> Result<Option<Record>> {
        self.request().get(key).await
    }

    /// Fetch many items by primary key. Only the key attributes of each
    /// record are sent; everything else is ignored.
    ///
    /// # Errors
    ///
    /// Fails when any record lacks a primary key attribute or a chunk is
    /// rejected.
    pub async fn multi_get(&self, records: &[Record]) -> Result<Vec<Record>> {
        self.request().batch_get(records).await
    }

    // ----- Writes -----

    /// Insert a record, failing when its key already exists. A missing sort
    /// key value is generated as a random UUID. Returns the record as
    /// written, timestamps and generated key included.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::PreconditionFailed`] on a duplicate key.
    pub async fn insert(&self, record: Record) -> Result<Record> {
        self.write_insert(record, InsertOptions::default()).await
    }

    /// Insert a record, overwriting any existing item with the same key and
    /// resetting both timestamps.
    ///
    /// # Errors
    ///
    /// Fails when the store rejects the write.
    pub async fn insert_or_replace(&self, record: Record) -> Result<Record> {
        self.write_insert(
            record,
            InsertOptions {
                replace: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Update a record's non-key attributes, creating the item when absent.
    ///
    /// # Errors
    ///
    /// Fails when `record` lacks a primary key attribute.
    pub async fn insert_or_update(&self, record: Record) -> Result<Option<Record>> {
        let key = record.clone();
        self.write_update(
            record,
            key,
            UpdateOptions {
                upsert: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Update a record's non-key attributes; the record itself supplies the
    /// key. Fails when the item does not exist.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidArgument`] on a missing key attribute and
    /// [`Error::PreconditionFailed`] on a missing item.
    pub async fn update(&self, record: Record) -> Result<Option<Record>> {
        let key = record.clone();
        self.write_update(record, key, UpdateOptions::default()).await
    }

    /// Update attributes on the item identified by `key`, which may differ
    /// from the attributes being written.
    ///
    /// # Errors
    ///
    /// As [`Table::update`].
    pub async fn update_where(&self, record: Record, key: Record) -> Result<Option<Record>> {
        self.write_update(record, key, UpdateOptions::default()).await
    }

    /// Delete the item identified by `key`, returning its old image.
    ///
    /// # Errors
    ///
    /// Fails when `key` lacks a primary key attribute or the store rejects
    /// the delete.
    pub async fn delete(&self, key: Record) -> Result<Option<Record>> {
        let mut request = self.request();
        let mut condition = None;
        self.apply_hook(WriteKind::Delete, &mut request, &mut None, &mut condition);
        if let Some(expression) = condition {
            request = request.condition(expression);
        }
        request.delete(&key).await
    }

    async fn write_insert(&self, mut record: Record, options: InsertOptions) -> Result<Record> {
        if let Some(sort) = self.schema.sort() {
            if !record.contains_key(sort) {
                record.insert(sort.to_owned(), Value::Str(Uuid::new_v4().to_string()));
            }
        }
        let mut request = self.request();
        let mut condition = None;
        self.apply_hook(WriteKind::Insert, &mut request, &mut None, &mut condition);
        if let Some(expression) = condition {
            request = request.condition(expression);
        }
        request.insert(&record, options).await
    }

    async fn write_update(
        &self,
        record: Record,
        key: Record,
        options: UpdateOptions,
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let skip = self.key_attrs();
        let mut update_expression = request
            .expressions_mut()
            .update(&record, &skip, &options.keep_existing, options.timestamp)
            .map(|clauses| format!("SET {clauses}"));
        let mut condition = None;
        self.apply_hook(
            WriteKind::Update,
            &mut request,
            &mut update_expression,
            &mut condition,
        );
        if let Some(expression) = condition {
            request = request.condition(expression);
        }
        match update_expression {
            Some(expression) => {
                request
                    .update(UpdateSpec::Expression(expression), &key, options)
                    .await
            }
            // Nothing to assign; let the engine decide what a bare update means.
            None => request.update(UpdateSpec::Record(record), &key, options).await,
        }
    }

    async fn run_update_expression(
        &self,
        mut request: Request,
        key: &Record,
        expression: String,
    ) -> Result<Option<Record>> {
        let mut update_expression = Some(expression);
        let mut condition = None;
        self.apply_hook(
            WriteKind::Update,
            &mut request,
            &mut update_expression,
            &mut condition,
        );
        if let Some(expression) = condition {
            request = request.condition(expression);
        }
        match update_expression {
            Some(expression) => {
                request
                    .update(UpdateSpec::Expression(expression), key, UpdateOptions::default())
                    .await
            }
            None => Err(Error::invalid_argument("hook removed the update expression")),
        }
    }

    // ----- List mutations -----

    /// Append `value` to the list at `path`, creating the list when absent.
    ///
    /// # Errors
    ///
    /// Fails when the item does not exist or the stored attribute is not a
    /// list.
    pub async fn append_to_list(
        &self,
        key: Record,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let clause = request
            .expressions_mut()
            .append_list(path, value.into(), false);
        self.run_update_expression(request, &key, format!("SET {clause}"))
            .await
    }

    /// Prepend `value` to the list at `path`, creating the list when absent.
    ///
    /// # Errors
    ///
    /// As [`Table::append_to_list`].
    pub async fn prepend_to_list(
        &self,
        key: Record,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let clause = request
            .expressions_mut()
            .append_list(path, value.into(), true);
        self.run_update_expression(request, &key, format!("SET {clause}"))
            .await
    }

    /// Remove the elements at the given positions from the list at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the item does not exist or `indexes` is empty (the store
    /// rejects an empty clause).
    pub async fn remove_from_list(
        &self,
        key: Record,
        path: &str,
        indexes: &[usize],
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let name = request.expressions_mut().tokenize_path(path);
        let targets: Vec<String> = indexes.iter().map(|i| format!("{name}[{i}]")).collect();
        self.run_update_expression(request, &key, format!("REMOVE {}", targets.join(", ")))
            .await
    }

    /// Overwrite the element at `index` in the list at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the item does not exist.
    pub async fn update_at_list(
        &self,
        key: Record,
        path: &str,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let exprs = request.expressions_mut();
        let name = exprs.tokenize_path(path);
        let placeholder = exprs.add_unique_value("element", &value.into());
        self.run_update_expression(
            request,
            &key,
            format!("SET {name}[{index}] = {placeholder}"),
        )
        .await
    }

    // ----- Set mutations -----

    /// Add values to one or more set attributes. Each entry's values must be
    /// homogeneously strings or numbers; entries that are not are skipped
    /// without error, since they cannot be represented as wire sets.
    ///
    /// # Errors
    ///
    /// Fails when the item does not exist, or when every entry was skipped
    /// and the store rejects the resulting empty clause.
    pub async fn add_to_set(
        &self,
        key: Record,
        sets: Vec<(String, Vec<Value>)>,
    ) -> Result<Option<Record>> {
        self.mutate_sets(key, sets, "ADD").await
    }

    /// Remove values from one or more set attributes. A set emptied by the
    /// removal disappears from the item entirely. Non-homogeneous entries
    /// are skipped as in [`Table::add_to_set`].
    ///
    /// # Errors
    ///
    /// As [`Table::add_to_set`].
    pub async fn remove_from_set(
        &self,
        key: Record,
        sets: Vec<(String, Vec<Value>)>,
    ) -> Result<Option<Record>> {
        self.mutate_sets(key, sets, "DELETE").await
    }

    async fn mutate_sets(
        &self,
        key: Record,
        sets: Vec<(String, Vec<Value>)>,
        verb: &str,
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let mut clauses = Vec::with_capacity(sets.len());
        for (attr, values) in sets {
            let Some(set) = as_homogeneous_set(values) else {
                debug!(attribute = %attr, "skipping non-homogeneous set values");
                continue;
            };
            let exprs = request.expressions_mut();
            let name = exprs.tokenize_path(&attr);
            let placeholder = exprs.add_unique_value(&attr, &set);
            clauses.push(format!("{name} {placeholder}"));
        }
        // An empty clause still goes out; the store's rejection is the
        // caller's signal that nothing was usable.
        self.run_update_expression(request, &key, format!("{verb} {}", clauses.join(", ")))
            .await
    }

    /// Remove arbitrary, possibly nested attributes from the item.
    ///
    /// # Errors
    ///
    /// Fails when the item does not exist or `paths` is empty.
    pub async fn remove_attributes(
        &self,
        key: Record,
        paths: &[&str],
    ) -> Result<Option<Record>> {
        let mut request = self.request();
        let exprs = request.expressions_mut();
        let targets: Vec<String> = paths.iter().map(|path| exprs.tokenize_path(path)).collect();
        self.run_update_expression(request, &key, format!("REMOVE {}", targets.join(", ")))
            .await
    }

    // ----- Bulk utilities -----

    /// Delete every item under `partition`, optionally narrowed to sort
    /// values matching `sort_prefix`. Returns the number of items deleted.
    ///
    /// # Errors
    ///
    /// Fails when a page fetch or batch delete is rejected.
    pub async fn clear(
        &self,
        partition: impl Into<Value>,
        sort_prefix: Option<Value>,
    ) -> Result<u64> {
        let partition = partition.into();
        let mut deleted = 0_u64;
        let mut after: Option<String> = None;
        loop {
            let mut fetch = self
                .fetch(partition.clone())
                .limit(CLEAR_PAGE_SIZE)
                .attributes("");
            if let Some(prefix) = sort_prefix.clone() {
                fetch = fetch.sort(prefix);
            }
            if let Some(token) = after.take() {
                fetch = fetch.after(token);
            }
            let page = fetch.run().await?;
            if page.items.is_empty() {
                break;
            }
            deleted += page.items.len() as u64;
            self.request().batch_write(&page.items, &[]).await?;
            match page.after {
                Some(token) => after = Some(token),
                None => break,
            }
        }
        Ok(deleted)
    }

    /// Move an item to a new primary key: delete the old item, merge the new
    /// key attributes into its image, and re-insert. `createdAt` survives
    /// the move; `updatedAt` is bumped.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::PreconditionFailed`] when the old key does not
    /// exist or the new key is already taken.
    pub async fn update_primary_keys(&self, key: Record, new_key: Record) -> Result<Record> {
        let old = self
            .request()
            .delete(&key)
            .await?
            .ok_or_else(|| Error::precondition_failed("record to re-key does not exist"))?;
        let mut record = old;
        for (attr, value) in new_key {
            record.insert(attr, value);
        }
        record.insert(UPDATED_AT.to_owned(), Value::Num(now_millis()));
        self.request()
            .insert(
                &record,
                InsertOptions {
                    replace: false,
                    preserve_timestamps: true,
                },
            )
            .await
    }
}

fn as_homogeneous_set(values: Vec<Value>) -> Option<Value> {
    if values.is_empty() {
        return None;
    }
    if values.iter().all(|v| matches!(v, Value::Str(_))) {
        let strings = values
            .into_iter()
            .filter_map(|v| match v {
                Value::Str(s) => Some(s),
                _ => None,
            })
            .collect();
        return Some(Value::StrSet(strings));
    }
    if values.iter().all(|v| matches!(v, Value::Num(_))) {
        let nums = values
            .into_iter()
            .filter_map(|v| match v {
                Value::Num(n) => Some(n),
                _ => None,
            })
            .collect();
        return Some(Value::NumSet(nums));
    }
    None
}

// ----- Fetch -----

/// One logical page of fetched items with its cursor tokens and stats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutput {
    /// Items in presentation order.
    pub items: Vec<Record>,
    /// Token for the page preceding this one, when known.
    pub before: Option<String>,
    /// Token for the page following this one, when more items exist.
    pub after: Option<String>,
    /// Items returned, after truncation to the page size.
    pub count: i64,
    /// Items the store examined.
    pub scanned_count: i64,
    /// Wire round trips issued.
    pub iteractions: usize,
}

type FilterFn = Box<dyn FnOnce(&mut Expressions) -> String + Send>;
type SelectorFn = Box<dyn FnMut(Record) -> Option<Record> + Send>;
type ReducerFn = Box<dyn FnOnce(Vec<Record>) -> Vec<Record> + Send>;

/// A configurable paginated read, started by [`Table::fetch`].
///
/// Strings given as the sort value match by prefix unless [`Fetch::exact`]
/// is set; numbers always match exactly. Paging runs forward from an
/// [`Fetch::after`] or [`Fetch::resume`] token and backward from a
/// [`Fetch::before`] token; [`CURSOR_FIRST`] and [`CURSOR_LAST`] stand in
/// for the edges. When both kinds of token are supplied, `before` wins.
pub struct Fetch<'a> {
    table: &'a Table,
    partition: Value,
    sort: Option<Value>,
    index: Option<String>,
    exact: bool,
    limit: Option<i64>,
    consistent: bool,
    desc: bool,
    select: Option<Select>,
    attributes: Option<String>,
    after: Option<String>,
    before: Option<String>,
    resume: Option<String>,
    filter: Option<FilterFn>,
    item_selector: Option<SelectorFn>,
    reducer: Option<ReducerFn>,
}

impl fmt::Debug for Fetch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetch")
            .field("table", &self.table.name)
            .field("index", &self.index)
            .field("sort", &self.sort)
            .field("exact", &self.exact)
            .field("limit", &self.limit)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

impl Fetch<'_> {
    /// Constrain the sort (or local index sort) attribute to this value.
    #[must_use]
    pub fn sort(mut self, value: impl Into<Value>) -> Self {
        self.sort = Some(value.into());
        self
    }

    /// Query a secondary index instead of the base table.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Match the sort value exactly even when it is a string.
    #[must_use]
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Logical page size.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Request strongly consistent reads.
    #[must_use]
    pub fn consistent(mut self) -> Self {
        self.consistent = true;
        self
    }

    /// Return items in descending sort order.
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.desc = true;
        self
    }

    /// Use a store-native projection mode.
    #[must_use]
    pub fn select(mut self, mode: Select) -> Self {
        self.select = Some(mode);
        self
    }

    /// Project only the named attributes (comma-separated). Key attributes
    /// are always included so cursors stay constructible.
    #[must_use]
    pub fn attributes(mut self, list: impl Into<String>) -> Self {
        self.attributes = Some(list.into());
        self
    }

    /// Page forward from a previously returned `after` token.
    #[must_use]
    pub fn after(mut self, token: impl Into<String>) -> Self {
        self.after = Some(token.into());
        self
    }

    /// Page backward from a previously returned `before` token.
    #[must_use]
    pub fn before(mut self, token: impl Into<String>) -> Self {
        self.before = Some(token.into());
        self
    }

    /// Resume forward from a previously returned `after` token.
    #[must_use]
    pub fn resume(mut self, token: impl Into<String>) -> Self {
        self.resume = Some(token.into());
        self
    }

    /// Attach a filter expression; the closure receives the operation's
    /// placeholder maps and returns the expression string.
    #[must_use]
    pub fn filter(mut self, build: impl FnOnce(&mut Expressions) -> String + Send + 'static) -> Self {
        self.filter = Some(Box::new(build));
        self
    }

    /// Transform or drop each item before materialization.
    #[must_use]
    pub fn item_selector(
        mut self,
        selector: impl FnMut(Record) -> Option<Record> + Send + 'static,
    ) -> Self {
        self.item_selector = Some(Box::new(selector));
        self
    }

    /// Replace the default collection of the final item batch.
    #[must_use]
    pub fn reducer(
        mut self,
        reduce: impl FnOnce(Vec<Record>) -> Vec<Record> + Send + 'static,
    ) -> Self {
        self.reducer = Some(Box::new(reduce));
        self
    }

    /// Execute the fetch.
    ///
    /// # Errors
    ///
    /// Fails on an unknown index, a sort value for a schema without a sort
    /// attribute, a malformed cursor token, or a store-level rejection.
    pub async fn run(self) -> Result<FetchOutput> {
        let resolved = self.table.schema.resolve_keys(self.index.as_deref())?;
        let backward = self.before.is_some();
        let token = if backward {
            self.before
        } else {
            self.after.or(self.resume)
        };
        let start_key = match token.as_deref() {
            None | Some(CURSOR_FIRST | CURSOR_LAST) => None,
            other => cursor::decode(other)?,
        };

        let mut request = self.table.request();
        if let Some(index) = self.index {
            request = request.index(index);
        }
        if let Some(limit) = self.limit {
            request = request.limit(limit);
        }
        if self.consistent {
            request = request.consistent();
        }
        if let Some(mode) = self.select {
            request = request.select(mode);
        }
        if let Some(list) = self.attributes {
            request = request.select(list);
        }

        // Key condition: partition equality, plus prefix or exact match on
        // the resolved range attribute when a sort value was given.
        {
            let exprs = request.expressions_mut();
            let name = exprs.add_name(&resolved.partition);
            let placeholder = exprs.add_value_auto("p", &self.partition);
            let mut clauses = vec![format!("{name} = {placeholder}")];
            if let Some(sort_value) = &self.sort {
                let attr = resolved.range_attribute().ok_or_else(|| {
                    Error::invalid_argument("sort value given, but no sort attribute resolved")
                })?;
                let name = exprs.add_name(attr);
                let placeholder = exprs.add_value_auto("s", sort_value);
                let clause = match sort_value {
                    Value::Str(_) if !self.exact => format!("begins_with({name}, {placeholder})"),
                    _ => format!("{name} = {placeholder}"),
                };
                clauses.push(clause);
            }
            request = request.key_condition(clauses.join(" AND "));
        }

        if let Some(build) = self.filter {
            let expression = build(request.expressions_mut());
            request = request.filter(expression);
        }
        if let Some(key) = start_key {
            request = request.resume(key);
        }
        // Backward pages scan in the opposite direction and are flipped
        // below, so the caller sees one consistent order either way.
        let engine_forward = if backward { self.desc } else { !self.desc };
        if !engine_forward {
            request = request.desc();
        }

        let QueryPage { mut items, stats } = request.query().await?;
        let mut before_key = stats.before;
        let mut after_key = stats.after;
        if backward {
            items.reverse();
            std::mem::swap(&mut before_key, &mut after_key);
        }
        if let Some(mut selector) = self.item_selector {
            items = items.into_iter().filter_map(|item| selector(item)).collect();
        }
        if let Some(reduce) = self.reducer {
            items = reduce(items);
        }
        Ok(FetchOutput {
            items,
            before: cursor::encode(before_key.as_ref()),
            after: cursor::encode(after_key.as_ref()),
            count: stats.count,
            scanned_count: stats.scanned_count,
            iteractions: stats.iteractions,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dynopage_model::{
        AttributeValue, BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput,
        BatchWriteItemOutput, DeleteItemInput, DeleteItemOutput, GetItemInput, GetItemOutput,
        Item, Key, PutItemInput, PutItemOutput, QueryInput, QueryOutput, ScanInput, ScanOutput,
        StoreError, UpdateItemInput, UpdateItemOutput,
    };

    use super::*;
    use crate::schema::IndexKeys;

    #[derive(Default)]
    struct StubClient {
        query_pages: Mutex<Vec<QueryOutput>>,
        query_inputs: Mutex<Vec<QueryInput>>,
        put_inputs: Mutex<Vec<PutItemInput>>,
        update_inputs: Mutex<Vec<UpdateItemInput>>,
        batch_write_inputs: Mutex<Vec<BatchWriteItemInput>>,
        delete_outputs: Mutex<Vec<DeleteItemOutput>>,
    }

    #[async_trait]
    impl StoreClient for StubClient {
        async fn get_item(&self, _input: GetItemInput) -> Result<GetItemOutput, StoreError> {
            Ok(GetItemOutput::default())
        }

        async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
            self.put_inputs.lock().unwrap().push(input);
            Ok(PutItemOutput::default())
        }

        async fn update_item(
            &self,
            input: UpdateItemInput,
        ) -> Result<UpdateItemOutput, StoreError> {
            self.update_inputs.lock().unwrap().push(input);
            Ok(UpdateItemOutput::default())
        }

        async fn delete_item(
            &self,
            _input: DeleteItemInput,
        ) -> Result<DeleteItemOutput, StoreError> {
            let mut outputs = self.delete_outputs.lock().unwrap();
            if outputs.is_empty() {
                Ok(DeleteItemOutput::default())
            } else {
                Ok(outputs.remove(0))
            }
        }

        async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
            self.query_inputs.lock().unwrap().push(input);
            let mut pages = self.query_pages.lock().unwrap();
            if pages.is_empty() {
                Ok(QueryOutput::default())
            } else {
                Ok(pages.remove(0))
            }
        }

        async fn scan(&self, _input: ScanInput) -> Result<ScanOutput, StoreError> {
            Ok(ScanOutput::default())
        }

        async fn batch_get_item(
            &self,
            _input: BatchGetItemInput,
        ) -> Result<BatchGetItemOutput, StoreError> {
            Ok(BatchGetItemOutput::default())
        }

        async fn batch_write_item(
            &self,
            input: BatchWriteItemInput,
        ) -> Result<BatchWriteItemOutput, StoreError> {
            self.batch_write_inputs.lock().unwrap().push(input);
            Ok(BatchWriteItemOutput::default())
        }
    }

    fn table(client: &Arc<StubClient>) -> Table {
        let store: Arc<dyn StoreClient> = client.clone();
        Table::builder()
            .client(store)
            .name("widgets")
            .schema(
                Schema::new("namespace")
                    .with_sort("id")
                    .with_index("byOwner", IndexKeys::new("owner").with_sort("id")),
            )
            .build()
            .unwrap()
    }

    fn wire_item(namespace: &str, id: &str) -> Item {
        Item::from([
            (
                "namespace".to_owned(),
                AttributeValue::S(namespace.to_owned()),
            ),
            ("id".to_owned(), AttributeValue::S(id.to_owned())),
        ])
    }

    fn page(items: Vec<Item>, more: bool) -> QueryOutput {
        let count = items.len() as i32;
        let last_evaluated_key = if more {
            items.last().cloned().unwrap_or_default()
        } else {
            Key::new()
        };
        QueryOutput {
            items,
            count,
            scanned_count: count,
            last_evaluated_key,
            consumed_capacity: None,
        }
    }

    #[test]
    fn test_should_fail_to_build_without_a_client() {
        let err = Table::builder()
            .name("widgets")
            .schema(Schema::new("pk"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_should_match_string_sort_values_by_prefix() {
        let client = Arc::new(StubClient::default());
        client.query_pages.lock().unwrap().push(page(vec![], false));
        table(&client)
            .fetch("app")
            .sort("user#")
            .run()
            .await
            .unwrap();
        let inputs = client.query_inputs.lock().unwrap();
        assert_eq!(
            inputs[0].key_condition_expression.as_deref(),
            Some("#namespace = :app AND begins_with(#id, :user_)")
        );
    }

    #[tokio::test]
    async fn test_should_match_numbers_and_exact_strings_by_equality() {
        let client = Arc::new(StubClient::default());
        {
            let mut pages = client.query_pages.lock().unwrap();
            pages.push(page(vec![], false));
            pages.push(page(vec![], false));
        }
        let table = table(&client);
        table.fetch("app").sort(7_i64).run().await.unwrap();
        table.fetch("app").sort("user#1").exact().run().await.unwrap();
        let inputs = client.query_inputs.lock().unwrap();
        assert_eq!(
            inputs[0].key_condition_expression.as_deref(),
            Some("#namespace = :app AND #id = :7")
        );
        assert_eq!(
            inputs[1].key_condition_expression.as_deref(),
            Some("#namespace = :app AND #id = :user_1")
        );
    }

    #[tokio::test]
    async fn test_should_treat_edge_sentinels_as_no_start_key() {
        let client = Arc::new(StubClient::default());
        {
            let mut pages = client.query_pages.lock().unwrap();
            pages.push(page(vec![], false));
            pages.push(page(vec![], false));
        }
        let table = table(&client);
        table
            .fetch("app")
            .after(CURSOR_FIRST)
            .run()
            .await
            .unwrap();
        table
            .fetch("app")
            .before(CURSOR_LAST)
            .run()
            .await
            .unwrap();
        let inputs = client.query_inputs.lock().unwrap();
        assert!(inputs[0].exclusive_start_key.is_empty());
        assert_eq!(inputs[0].scan_index_forward, Some(true));
        assert!(inputs[1].exclusive_start_key.is_empty());
        // Backward pages scan descending and are flipped afterwards.
        assert_eq!(inputs[1].scan_index_forward, Some(false));
    }

    #[tokio::test]
    async fn test_should_reverse_backward_pages_and_swap_cursors() {
        let client = Arc::new(StubClient::default());
        client.query_pages.lock().unwrap().push(page(
            vec![
                wire_item("app", "id-6"),
                wire_item("app", "id-5"),
                wire_item("app", "id-4"),
            ],
            true,
        ));
        let boundary = cursor::encode(Some(&wire_item("app", "id-7"))).unwrap();
        let out = table(&client)
            .fetch("app")
            .limit(2)
            .before(boundary)
            .run()
            .await
            .unwrap();
        let ids: Vec<_> = out
            .items
            .iter()
            .map(|item| item["id"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(ids, ["id-5", "id-6"]);
        // The engine's forward continuation becomes the caller's "before",
        // and the captured resume boundary becomes the caller's "after".
        let before = cursor::decode(out.before.as_deref()).unwrap().unwrap();
        assert_eq!(before["id"], AttributeValue::S("id-5".into()));
        let after = cursor::decode(out.after.as_deref()).unwrap().unwrap();
        assert_eq!(after["id"], AttributeValue::S("id-6".into()));
    }

    #[tokio::test]
    async fn test_should_reject_malformed_cursor_tokens() {
        let client = Arc::new(StubClient::default());
        let err = table(&client)
            .fetch("app")
            .after("@@not-a-cursor@@")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_should_apply_item_selector_and_reducer() {
        let client = Arc::new(StubClient::default());
        client.query_pages.lock().unwrap().push(page(
            vec![
                wire_item("app", "id-1"),
                wire_item("app", "id-2"),
                wire_item("app", "id-3"),
            ],
            false,
        ));
        let out = table(&client)
            .fetch("app")
            .item_selector(|item| {
                if item["id"].as_str() == Some("id-2") {
                    None
                } else {
                    Some(item)
                }
            })
            .reducer(|mut items| {
                items.reverse();
                items
            })
            .run()
            .await
            .unwrap();
        let ids: Vec<_> = out
            .items
            .iter()
            .map(|item| item["id"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(ids, ["id-3", "id-1"]);
        // Stats reflect the store's view, not the selector's.
        assert_eq!(out.count, 3);
    }

    #[tokio::test]
    async fn test_should_generate_a_sort_key_on_insert_when_missing() {
        let client = Arc::new(StubClient::default());
        let written = table(&client)
            .insert(Record::from([(
                "namespace".to_owned(),
                Value::from("app"),
            )]))
            .await
            .unwrap();
        let id = written["id"].as_str().unwrap();
        assert_eq!(id.len(), 36);
        let inputs = client.put_inputs.lock().unwrap();
        assert!(inputs[0].item.contains_key("id"));
        assert_eq!(
            inputs[0].condition_expression.as_deref(),
            Some("attribute_not_exists(#namespace)")
        );
    }

    #[tokio::test]
    async fn test_should_build_add_clause_with_wire_sets() {
        let client = Arc::new(StubClient::default());
        let key = Record::from([
            ("namespace".to_owned(), Value::from("app")),
            ("id".to_owned(), Value::from("id-1")),
        ]);
        table(&client)
            .add_to_set(
                key,
                vec![
                    ("tags".to_owned(), vec![Value::from("a"), Value::from("b")]),
                    (
                        "mixed".to_owned(),
                        vec![Value::from("a"), Value::from(1_i64)],
                    ),
                ],
            )
            .await
            .unwrap();
        let inputs = client.update_inputs.lock().unwrap();
        assert_eq!(
            inputs[0].update_expression.as_deref(),
            Some("ADD #tags :tags_0")
        );
        assert_eq!(
            inputs[0].expression_attribute_values[":tags_0"],
            AttributeValue::SS(vec!["a".to_owned(), "b".to_owned()])
        );
    }

    #[tokio::test]
    async fn test_should_dispatch_empty_set_clauses_for_the_store_to_reject() {
        let client = Arc::new(StubClient::default());
        let key = Record::from([
            ("namespace".to_owned(), Value::from("app")),
            ("id".to_owned(), Value::from("id-1")),
        ]);
        table(&client)
            .remove_from_set(
                key,
                vec![(
                    "mixed".to_owned(),
                    vec![Value::from("a"), Value::from(1_i64)],
                )],
            )
            .await
            .unwrap();
        let inputs = client.update_inputs.lock().unwrap();
        assert_eq!(inputs[0].update_expression.as_deref(), Some("DELETE "));
    }

    #[tokio::test]
    async fn test_should_build_remove_clauses_for_lists_and_attributes() {
        let client = Arc::new(StubClient::default());
        let key = Record::from([
            ("namespace".to_owned(), Value::from("app")),
            ("id".to_owned(), Value::from("id-1")),
        ]);
        let table = table(&client);
        table
            .remove_from_list(key.clone(), "deep.items", &[1, 3])
            .await
            .unwrap();
        table
            .remove_attributes(key, &["legacy", "meta.flag"])
            .await
            .unwrap();
        let inputs = client.update_inputs.lock().unwrap();
        assert_eq!(
            inputs[0].update_expression.as_deref(),
            Some("REMOVE #deep.#items[1], #deep.#items[3]")
        );
        assert_eq!(
            inputs[1].update_expression.as_deref(),
            Some("REMOVE #legacy, #meta.#flag")
        );
    }

    #[tokio::test]
    async fn test_should_let_hooks_override_the_condition() {
        let client = Arc::new(StubClient::default());
        let hook: WriteHook = Arc::new(|ctx| {
            assert_eq!(ctx.operation, WriteKind::Insert);
            assert_eq!(ctx.partition_attr, "namespace");
            Some(HookOverride {
                condition_expression: Some("attribute_exists(#approved)".to_owned()),
                ..Default::default()
            })
        });
        let store: Arc<dyn StoreClient> = client.clone();
        let table = Table::builder()
            .client(store)
            .name("widgets")
            .schema(Schema::new("namespace").with_sort("id"))
            .hook(hook)
            .build()
            .unwrap();
        table
            .insert(Record::from([
                ("namespace".to_owned(), Value::from("app")),
                ("id".to_owned(), Value::from("id-1")),
            ]))
            .await
            .unwrap();
        let inputs = client.put_inputs.lock().unwrap();
        assert_eq!(
            inputs[0].condition_expression.as_deref(),
            Some("attribute_not_exists(#namespace) AND (attribute_exists(#approved))")
        );
    }

    #[tokio::test]
    async fn test_should_clear_pages_until_exhausted() {
        let client = Arc::new(StubClient::default());
        {
            let mut pages = client.query_pages.lock().unwrap();
            pages.push(page(
                vec![wire_item("app", "id-1"), wire_item("app", "id-2")],
                true,
            ));
            pages.push(page(vec![wire_item("app", "id-3")], false));
        }
        let deleted = table(&client).clear("app", None).await.unwrap();
        assert_eq!(deleted, 3);
        let writes = client.batch_write_inputs.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let requests = &writes[0].request_items["widgets"];
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|w| w.delete_request.is_some()));
        let reads = client.query_inputs.lock().unwrap();
        assert_eq!(reads.len(), 2);
        // Key-only projection keeps delete pages small.
        assert_eq!(
            reads[0].projection_expression.as_deref(),
            Some("#namespace_0, #id_1")
        );
        assert_eq!(
            reads[1].exclusive_start_key["id"],
            AttributeValue::S("id-2".into())
        );
    }

    #[tokio::test]
    async fn test_should_re_key_records_preserving_created_at() {
        let client = Arc::new(StubClient::default());
        client.delete_outputs.lock().unwrap().push(DeleteItemOutput {
            attributes: Some(Item::from([
                ("namespace".to_owned(), AttributeValue::S("app".into())),
                ("id".to_owned(), AttributeValue::S("old".into())),
                ("name".to_owned(), AttributeValue::S("thing".into())),
                ("createdAt".to_owned(), AttributeValue::N("100".into())),
                ("updatedAt".to_owned(), AttributeValue::N("100".into())),
            ])),
            consumed_capacity: None,
        });
        let moved = table(&client)
            .update_primary_keys(
                Record::from([
                    ("namespace".to_owned(), Value::from("app")),
                    ("id".to_owned(), Value::from("old")),
                ]),
                Record::from([("id".to_owned(), Value::from("new"))]),
            )
            .await
            .unwrap();
        assert_eq!(moved["id"], Value::from("new"));
        assert_eq!(moved["name"], Value::from("thing"));
        assert_eq!(moved["createdAt"], Value::from(100_i64));
        assert!(moved["updatedAt"].as_num().unwrap() > 100.0);
        let puts = client.put_inputs.lock().unwrap();
        assert_eq!(puts[0].item["createdAt"], AttributeValue::N("100".into()));
    }

    #[tokio::test]
    async fn test_should_fail_re_keying_a_missing_record() {
        let client = Arc::new(StubClient::default());
        let err = table(&client)
            .update_primary_keys(
                Record::from([
                    ("namespace".to_owned(), Value::from("app")),
                    ("id".to_owned(), Value::from("ghost")),
                ]),
                Record::from([("id".to_owned(), Value::from("new"))]),
            )
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }
}
