//! The in-memory store client.
//!
//! [`MemoryStore`] implements [`StoreClient`] over [`TableData`] storage,
//! with the same observable behavior the wire service has: typed key
//! ordering, conditional writes, update expressions, index queries, paging
//! with resume keys, batch size caps, and the service's error vocabulary.
//! A small failure-injection queue makes retry paths testable.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dynopage_core::StoreClient;
use dynopage_model::{
    AttributeValue, BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput,
    BatchWriteItemOutput, DeleteItemInput, DeleteItemOutput, ExpressionAttributeNames,
    ExpressionAttributeValues, GetItemInput, GetItemOutput, Item, Key, KeySchemaElement, KeyType,
    PutItemInput, PutItemOutput, QueryInput, QueryOutput, ReturnValue, ScanInput, ScanOutput,
    Select, StoreError, UpdateItemInput, UpdateItemOutput, MAX_BATCH_GET_ITEMS,
    MAX_BATCH_WRITE_ITEMS,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::expression::ast::{CompareOp, Expr, Operand, Path, Seg, Update};
use crate::expression::evaluator::{resolve_name, ExprEnv};
use crate::expression::parser::{parse_condition, parse_projection, parse_update, ExprError};
use crate::storage::{
    sort_value_from, IndexSpec, KeyError, KeySpec, SortCondition, SortValue, TableData,
};

/// Declarative table definition for [`MemoryStore::create_table`].
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    key_schema: Vec<KeySchemaElement>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Start a definition for the named table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_schema: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Declare the partition key attribute.
    #[must_use]
    pub fn with_partition(mut self, attribute: impl Into<String>) -> Self {
        self.key_schema
            .push(KeySchemaElement::new(attribute, KeyType::Hash));
        self
    }

    /// Declare the sort key attribute.
    #[must_use]
    pub fn with_sort(mut self, attribute: impl Into<String>) -> Self {
        self.key_schema
            .push(KeySchemaElement::new(attribute, KeyType::Range));
        self
    }

    /// Attach a secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }
}

/// Declarative secondary-index definition.
#[derive(Debug, Clone)]
pub struct IndexDef {
    name: String,
    partition: String,
    sort: Option<String>,
}

impl IndexDef {
    /// An index over the given partition attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: partition.into(),
            sort: None,
        }
    }

    /// Declare the index sort attribute.
    #[must_use]
    pub fn with_sort(mut self, attribute: impl Into<String>) -> Self {
        self.sort = Some(attribute.into());
        self
    }
}

/// In-memory [`StoreClient`] backend.
///
/// Tables must be created before use; every operation against an undeclared
/// table fails with the service's resource-not-found error. Failures queued
/// with [`MemoryStore::inject_failure`] are returned one per call, ahead of
/// the operation itself.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Arc<TableData>>,
    faults: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    /// An empty store with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from its definition.
    ///
    /// # Errors
    ///
    /// Fails when the table already exists or the key schema lacks a
    /// partition key.
    pub fn create_table(&self, def: TableDef) -> Result<(), StoreError> {
        let keys = KeySpec::from_elements(&def.key_schema)
            .map_err(|err| StoreError::validation(err.to_string()))?;
        let indexes = def
            .indexes
            .into_iter()
            .map(|index| IndexSpec {
                name: index.name,
                partition: index.partition,
                sort: index.sort,
            })
            .collect();
        match self.tables.entry(def.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::validation(format!(
                "Table already exists: {}",
                def.name
            ))),
            Entry::Vacant(slot) => {
                debug!(table = %def.name, "create table");
                slot.insert(Arc::new(TableData::new(def.name, keys, indexes)));
                Ok(())
            }
        }
    }

    /// Drop all tables, items, and pending injected failures.
    pub fn reset(&self) {
        debug!("reset store");
        self.tables.clear();
        self.faults.lock().clear();
    }

    /// Queue an error to be returned by the next operation, ahead of the
    /// operation itself. Queued failures are consumed in order.
    pub fn inject_failure(&self, error: StoreError) {
        debug!(code = %error.code, "inject failure");
        self.faults.lock().push_back(error);
    }

    fn next_fault(&self) -> Result<(), StoreError> {
        match self.faults.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn table(&self, name: &str) -> Result<Arc<TableData>, StoreError> {
        self.tables
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::resource_not_found(name))
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        self.next_fault()?;
        let table = self.table(&input.table_name)?;
        let item = table.get(&input.key).map_err(key_error)?;
        let item = match item {
            Some(item) => Some(apply_projection(
                item,
                input.projection_expression.as_deref(),
                &input.expression_attribute_names,
            )?),
            None => None,
        };
        Ok(GetItemOutput {
            item,
            ..Default::default()
        })
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        self.next_fault()?;
        let table = self.table(&input.table_name)?;
        if let Some(condition) = input.condition_expression.as_deref() {
            let existing = table
                .get(&table.primary_key_of(&input.item))
                .map_err(key_error)?;
            check_condition(
                condition,
                existing.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
        }
        let previous = table.put(input.item).map_err(key_error)?;
        let attributes = match input.return_values {
            Some(ReturnValue::AllOld) => previous,
            _ => None,
        };
        Ok(PutItemOutput {
            attributes,
            ..Default::default()
        })
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        self.next_fault()?;
        let table = self.table(&input.table_name)?;
        let names = &input.expression_attribute_names;
        let values = &input.expression_attribute_values;

        let existing = table.get(&input.key).map_err(key_error)?;
        if let Some(condition) = input.condition_expression.as_deref() {
            check_condition(condition, existing.as_ref(), names, values)?;
        }

        let update = match input.update_expression.as_deref() {
            Some(text) => {
                Some(parse_update(text).map_err(|err| invalid_expression("UpdateExpression", &err))?)
            }
            None => None,
        };
        let touched = match &update {
            Some(update) => touched_attributes(update, names)
                .map_err(|err| invalid_expression("UpdateExpression", &err))?,
            None => Vec::new(),
        };
        for attr in &touched {
            if *attr == table.keys().partition || Some(attr.as_str()) == table.keys().sort.as_deref()
            {
                return Err(StoreError::validation(format!(
                    "Cannot update attribute {attr}. This attribute is part of the key"
                )));
            }
        }

        // Updates against a missing item start from its key attributes.
        let base = match &existing {
            Some(item) => item.clone(),
            None => input.key.clone(),
        };
        let next = match &update {
            Some(update) => ExprEnv {
                item: &base,
                names,
                values,
            }
            .apply(update)
            .map_err(|err| invalid_expression("UpdateExpression", &err))?,
            None => base,
        };
        table.put(next.clone()).map_err(key_error)?;

        let attributes = return_image(input.return_values, existing.as_ref(), &next, &touched);
        Ok(UpdateItemOutput {
            attributes,
            ..Default::default()
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        self.next_fault()?;
        let table = self.table(&input.table_name)?;
        if let Some(condition) = input.condition_expression.as_deref() {
            let existing = table.get(&input.key).map_err(key_error)?;
            check_condition(
                condition,
                existing.as_ref(),
                &input.expression_attribute_names,
                &input.expression_attribute_values,
            )?;
        }
        let removed = table.remove(&input.key).map_err(key_error)?;
        let attributes = match input.return_values {
            Some(ReturnValue::AllOld) => removed,
            _ => None,
        };
        Ok(DeleteItemOutput {
            attributes,
            ..Default::default()
        })
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        self.next_fault()?;
        let table = self.table(&input.table_name)?;
        let Some(expression) = input.key_condition_expression.as_deref() else {
            return Err(StoreError::validation(
                "KeyConditionExpression is required for Query",
            ));
        };
        let expr = parse_condition(expression)
            .map_err(|err| invalid_expression("KeyConditionExpression", &err))?;
        let names = &input.expression_attribute_names;
        let values = &input.expression_attribute_values;
        let forward = input.scan_index_forward.unwrap_or(true);
        let limit = request_limit(input.limit)?;
        let start = optional_key(&input.exclusive_start_key);

        let index = match input.index_name.as_deref() {
            Some(name) => Some(
                table
                    .index(name)
                    .cloned()
                    .ok_or_else(|| unknown_index(name))?,
            ),
            None => None,
        };
        let (partition_attr, sort_attr) = match &index {
            Some(index) => (index.partition.as_str(), index.sort.as_deref()),
            None => (
                table.keys().partition.as_str(),
                table.keys().sort.as_deref(),
            ),
        };
        let condition = key_condition_from(&expr, partition_attr, sort_attr, names, values)?;

        let (items, last_key) = match &index {
            Some(index) => table.query_index(
                index,
                &condition.partition_value,
                condition.sort.as_ref(),
                forward,
                limit,
                start,
            ),
            None => table.query(
                &condition.partition_value,
                condition.sort.as_ref(),
                forward,
                limit,
                start,
            ),
        }
        .map_err(key_error)?;

        let (items, count, scanned_count) = finish_read(
            items,
            input.filter_expression.as_deref(),
            input.projection_expression.as_deref(),
            input.select,
            names,
            values,
        )?;
        Ok(QueryOutput {
            items,
            count,
            scanned_count,
            last_evaluated_key: last_key.unwrap_or_default(),
            ..Default::default()
        })
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError> {
        self.next_fault()?;
        let table = self.table(&input.table_name)?;
        let limit = request_limit(input.limit)?;
        let segments = scan_segments(input.segment, input.total_segments)?;
        let start = optional_key(&input.exclusive_start_key);
        let index = match input.index_name.as_deref() {
            Some(name) => Some(
                table
                    .index(name)
                    .cloned()
                    .ok_or_else(|| unknown_index(name))?,
            ),
            None => None,
        };

        let (items, last_key) = table.scan(limit, start, segments).map_err(key_error)?;
        // An index scan only sees items with valid index key attributes.
        let items = match &index {
            Some(index) => items
                .into_iter()
                .filter(|item| index_visible(item, index))
                .collect(),
            None => items,
        };

        let (items, count, scanned_count) = finish_read(
            items,
            input.filter_expression.as_deref(),
            input.projection_expression.as_deref(),
            input.select,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
        )?;
        Ok(ScanOutput {
            items,
            count,
            scanned_count,
            last_evaluated_key: last_key.unwrap_or_default(),
            ..Default::default()
        })
    }

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, StoreError> {
        self.next_fault()?;
        if input.request_items.is_empty() {
            return Err(StoreError::validation("RequestItems must not be empty"));
        }
        let total: usize = input
            .request_items
            .values()
            .map(|request| request.keys.len())
            .sum();
        if total > MAX_BATCH_GET_ITEMS {
            return Err(StoreError::validation(
                "Too many items requested for the BatchGetItem call",
            ));
        }

        let mut responses: HashMap<String, Vec<Item>> = HashMap::new();
        for (table_name, request) in &input.request_items {
            if request.keys.is_empty() {
                return Err(StoreError::validation(format!(
                    "No keys were provided for table: {table_name}"
                )));
            }
            let table = self.table(table_name)?;
            let mut found = Vec::new();
            for key in &request.keys {
                if let Some(item) = table.get(key).map_err(key_error)? {
                    found.push(apply_projection(
                        item,
                        request.projection_expression.as_deref(),
                        &request.expression_attribute_names,
                    )?);
                }
            }
            responses.insert(table_name.clone(), found);
        }
        Ok(BatchGetItemOutput {
            responses,
            ..Default::default()
        })
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, StoreError> {
        self.next_fault()?;
        if input.request_items.is_empty() {
            return Err(StoreError::validation("RequestItems must not be empty"));
        }
        let total: usize = input.request_items.values().map(Vec::len).sum();
        if total > MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError::validation(
                "Too many items requested for the BatchWriteItem call",
            ));
        }
        // Validate the whole batch before touching storage.
        let mut tables = HashMap::new();
        for (table_name, writes) in &input.request_items {
            for write in writes {
                if write.put_request.is_some() == write.delete_request.is_some() {
                    return Err(StoreError::validation(
                        "Exactly one of PutRequest or DeleteRequest must be set",
                    ));
                }
            }
            tables.insert(table_name.clone(), self.table(table_name)?);
        }

        for (table_name, writes) in input.request_items {
            let Some(table) = tables.get(&table_name) else {
                continue;
            };
            for write in writes {
                if let Some(put) = write.put_request {
                    table.put(put.item).map_err(key_error)?;
                } else if let Some(delete) = write.delete_request {
                    table.remove(&delete.key).map_err(key_error)?;
                }
            }
        }
        Ok(BatchWriteItemOutput::default())
    }
}

// ---------------------------------------------------------------------------
// Key conditions
// ---------------------------------------------------------------------------

struct KeyCondition {
    partition_value: AttributeValue,
    sort: Option<SortCondition>,
}

/// Split a parsed key-condition expression into the partition equality and
/// the optional sort-key constraint.
fn key_condition_from(
    expr: &Expr,
    partition_attr: &str,
    sort_attr: Option<&str>,
    names: &ExpressionAttributeNames,
    values: &ExpressionAttributeValues,
) -> Result<KeyCondition, StoreError> {
    match expr {
        Expr::And(lhs, rhs) => {
            let attempt = |partition: &Expr, sort: &Expr| -> Result<KeyCondition, StoreError> {
                let partition_value =
                    partition_equality(partition, partition_attr, names, values)?;
                let Some(sort_attr) = sort_attr else {
                    return Err(StoreError::validation("Query key condition not supported"));
                };
                let sort = sort_condition_from(sort, sort_attr, names, values)?;
                Ok(KeyCondition {
                    partition_value,
                    sort: Some(sort),
                })
            };
            match attempt(lhs, rhs) {
                Ok(condition) => Ok(condition),
                Err(first) => attempt(rhs, lhs).map_err(|_| first),
            }
        }
        Expr::Compare {
            op: CompareOp::Eq, ..
        } => {
            let partition_value = partition_equality(expr, partition_attr, names, values)?;
            Ok(KeyCondition {
                partition_value,
                sort: None,
            })
        }
        _ => Err(StoreError::validation(
            "KeyConditionExpression must contain an equality condition on the partition key",
        )),
    }
}

fn partition_equality(
    expr: &Expr,
    partition_attr: &str,
    names: &ExpressionAttributeNames,
    values: &ExpressionAttributeValues,
) -> Result<AttributeValue, StoreError> {
    let Expr::Compare {
        op: CompareOp::Eq,
        lhs,
        rhs,
    } = expr
    else {
        return Err(StoreError::validation(
            "KeyConditionExpression must contain an equality condition on the partition key",
        ));
    };
    let (path, operand) = match (lhs, rhs) {
        (Operand::Path(path), Operand::Value(_)) => (path, rhs),
        (Operand::Value(_), Operand::Path(path)) => (path, lhs),
        _ => {
            return Err(StoreError::validation(
                "KeyConditionExpression must contain an equality condition on the partition key",
            ));
        }
    };
    if key_path_attr(path, names)? != partition_attr {
        return Err(StoreError::validation(format!(
            "Query condition missed key schema element: {partition_attr}"
        )));
    }
    resolve_value(operand, values)
}

fn sort_condition_from(
    expr: &Expr,
    sort_attr: &str,
    names: &ExpressionAttributeNames,
    values: &ExpressionAttributeValues,
) -> Result<SortCondition, StoreError> {
    match expr {
        Expr::Compare { op, lhs, rhs } => {
            // A value on the left flips the comparison.
            let (path, operand, op) = match (lhs, rhs) {
                (Operand::Path(path), Operand::Value(_)) => (path, rhs, *op),
                (Operand::Value(_), Operand::Path(path)) => (path, lhs, flip(*op)),
                _ => {
                    return Err(StoreError::validation("Query key condition not supported"));
                }
            };
            require_sort_attr(path, sort_attr, names)?;
            let value = resolve_value(operand, values)?;
            let sort_value = key_sort_value(sort_attr, &value)?;
            match op {
                CompareOp::Eq => Ok(SortCondition::Eq(sort_value)),
                CompareOp::Lt => Ok(SortCondition::Lt(sort_value)),
                CompareOp::Le => Ok(SortCondition::Le(sort_value)),
                CompareOp::Gt => Ok(SortCondition::Gt(sort_value)),
                CompareOp::Ge => Ok(SortCondition::Ge(sort_value)),
                CompareOp::Ne => Err(StoreError::validation(
                    "Sort key condition does not support <> operator",
                )),
            }
        }
        Expr::Between { probe, low, high } => {
            let Operand::Path(path) = probe else {
                return Err(StoreError::validation("Query key condition not supported"));
            };
            require_sort_attr(path, sort_attr, names)?;
            let low = key_sort_value(sort_attr, &resolve_value(low, values)?)?;
            let high = key_sort_value(sort_attr, &resolve_value(high, values)?)?;
            Ok(SortCondition::Between(low, high))
        }
        Expr::BeginsWith(path, operand) => {
            require_sort_attr(path, sort_attr, names)?;
            match resolve_value(operand, values)? {
                AttributeValue::S(prefix) => Ok(SortCondition::BeginsWith(prefix)),
                _ => Err(StoreError::validation(
                    "begins_with in a key condition requires a string prefix",
                )),
            }
        }
        _ => Err(StoreError::validation(
            "KeyConditionExpressions must only contain one condition per key",
        )),
    }
}

fn require_sort_attr(
    path: &Path,
    sort_attr: &str,
    names: &ExpressionAttributeNames,
) -> Result<(), StoreError> {
    if key_path_attr(path, names)? == sort_attr {
        Ok(())
    } else {
        Err(StoreError::validation(format!(
            "Query condition missed key schema element: {sort_attr}"
        )))
    }
}

fn key_path_attr<'e>(
    path: &'e Path,
    names: &'e ExpressionAttributeNames,
) -> Result<&'e str, StoreError> {
    match path.segments.as_slice() {
        [Seg::Attr(raw)] => resolve_name(raw, names)
            .map_err(|err| invalid_expression("KeyConditionExpression", &err)),
        _ => Err(StoreError::validation(
            "Key attributes must be top-level attribute names",
        )),
    }
}

fn resolve_value(
    operand: &Operand,
    values: &ExpressionAttributeValues,
) -> Result<AttributeValue, StoreError> {
    match operand {
        Operand::Value(token) => values.get(token).cloned().ok_or_else(|| {
            StoreError::validation(format!(
                "Value {token} not found in ExpressionAttributeValues"
            ))
        }),
        _ => Err(StoreError::validation(
            "Key conditions must compare against expression attribute values",
        )),
    }
}

fn key_sort_value(attr: &str, value: &AttributeValue) -> Result<SortValue, StoreError> {
    sort_value_from(attr, value).map_err(key_error)
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        CompareOp::Eq | CompareOp::Ne => op,
    }
}

// ---------------------------------------------------------------------------
// Shared read/write plumbing
// ---------------------------------------------------------------------------

/// Filter, count, apply `Select`, and project a page of items.
fn finish_read(
    items: Vec<Item>,
    filter: Option<&str>,
    projection: Option<&str>,
    select: Option<Select>,
    names: &ExpressionAttributeNames,
    values: &ExpressionAttributeValues,
) -> Result<(Vec<Item>, i32, i32), StoreError> {
    let scanned_count = to_count(items.len());
    let items = match filter {
        Some(filter) => {
            let expr = parse_condition(filter)
                .map_err(|err| invalid_expression("FilterExpression", &err))?;
            let mut kept = Vec::new();
            for item in items {
                let matched = ExprEnv {
                    item: &item,
                    names,
                    values,
                }
                .matches(&expr)
                .map_err(|err| invalid_expression("FilterExpression", &err))?;
                if matched {
                    kept.push(item);
                }
            }
            kept
        }
        None => items,
    };
    let count = to_count(items.len());
    if matches!(select, Some(Select::Count)) {
        return Ok((Vec::new(), count, scanned_count));
    }
    let items = match projection {
        Some(projection) => {
            let paths = parse_projection(projection)
                .map_err(|err| invalid_expression("ProjectionExpression", &err))?;
            let mut projected = Vec::with_capacity(items.len());
            for item in &items {
                let narrowed = ExprEnv {
                    item,
                    names,
                    values,
                }
                .project(&paths)
                .map_err(|err| invalid_expression("ProjectionExpression", &err))?;
                projected.push(narrowed);
            }
            projected
        }
        None => items,
    };
    Ok((items, count, scanned_count))
}

fn check_condition(
    condition: &str,
    existing: Option<&Item>,
    names: &ExpressionAttributeNames,
    values: &ExpressionAttributeValues,
) -> Result<(), StoreError> {
    let expr =
        parse_condition(condition).map_err(|err| invalid_expression("ConditionExpression", &err))?;
    let empty = Item::new();
    let matched = ExprEnv {
        item: existing.unwrap_or(&empty),
        names,
        values,
    }
    .matches(&expr)
    .map_err(|err| invalid_expression("ConditionExpression", &err))?;
    if matched {
        Ok(())
    } else {
        Err(StoreError::conditional_check_failed(
            "The conditional request failed",
        ))
    }
}

fn apply_projection(
    item: Item,
    projection: Option<&str>,
    names: &ExpressionAttributeNames,
) -> Result<Item, StoreError> {
    let Some(projection) = projection else {
        return Ok(item);
    };
    let paths =
        parse_projection(projection).map_err(|err| invalid_expression("ProjectionExpression", &err))?;
    let values = ExpressionAttributeValues::new();
    ExprEnv {
        item: &item,
        names,
        values: &values,
    }
    .project(&paths)
    .map_err(|err| invalid_expression("ProjectionExpression", &err))
}

/// Top-level attribute names an update writes, removes, or merges into.
fn touched_attributes(
    update: &Update,
    names: &ExpressionAttributeNames,
) -> Result<Vec<String>, ExprError> {
    let mut out: Vec<String> = Vec::new();
    let paths = update
        .set
        .iter()
        .map(|assign| &assign.path)
        .chain(update.remove.iter())
        .chain(update.add.iter().map(|(path, _)| path))
        .chain(update.delete.iter().map(|(path, _)| path));
    for path in paths {
        let Some(head) = path.head() else {
            continue;
        };
        let name = resolve_name(head, names)?;
        if !out.iter().any(|existing| existing == name) {
            out.push(name.to_owned());
        }
    }
    Ok(out)
}

fn return_image(
    mode: Option<ReturnValue>,
    old: Option<&Item>,
    new: &Item,
    touched: &[String],
) -> Option<Item> {
    match mode.unwrap_or(ReturnValue::None) {
        ReturnValue::None => None,
        ReturnValue::AllOld => old.cloned(),
        ReturnValue::AllNew => Some(new.clone()),
        ReturnValue::UpdatedOld => old
            .map(|item| pick_attributes(item, touched))
            .filter(|image| !image.is_empty()),
        ReturnValue::UpdatedNew => {
            Some(pick_attributes(new, touched)).filter(|image| !image.is_empty())
        }
    }
}

fn pick_attributes(item: &Item, attrs: &[String]) -> Item {
    attrs
        .iter()
        .filter_map(|attr| item.get(attr).map(|value| (attr.clone(), value.clone())))
        .collect()
}

/// Whether an item carries the key attributes a sparse index requires.
fn index_visible(item: &Item, index: &IndexSpec) -> bool {
    let has_valid = |attr: &str| {
        item.get(attr)
            .is_some_and(|value| sort_value_from(attr, value).is_ok())
    };
    has_valid(&index.partition)
        && index.sort.as_deref().is_none_or(|attr| has_valid(attr))
}

fn request_limit(limit: Option<i64>) -> Result<usize, StoreError> {
    match limit {
        None => Ok(usize::MAX),
        Some(value) if value >= 1 => Ok(usize::try_from(value).unwrap_or(usize::MAX)),
        Some(value) => Err(StoreError::validation(format!(
            "Limit must be at least 1, got {value}"
        ))),
    }
}

fn scan_segments(
    segment: Option<i32>,
    total_segments: Option<i32>,
) -> Result<Option<(u64, u64)>, StoreError> {
    match (segment, total_segments) {
        (None, None) => Ok(None),
        (Some(segment), Some(total)) => {
            if total < 1 {
                return Err(StoreError::validation(format!(
                    "TotalSegments must be at least 1, got {total}"
                )));
            }
            if segment < 0 || segment >= total {
                return Err(StoreError::validation(format!(
                    "Segment must be between 0 and {}, got {segment}",
                    total - 1
                )));
            }
            Ok(Some((
                u64::try_from(segment).unwrap_or(0),
                u64::try_from(total).unwrap_or(1),
            )))
        }
        _ => Err(StoreError::validation(
            "Segment and TotalSegments must be specified together",
        )),
    }
}

fn optional_key(key: &Key) -> Option<&Key> {
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn unknown_index(name: &str) -> StoreError {
    StoreError::validation(format!(
        "The table does not have the specified index: {name}"
    ))
}

fn invalid_expression(kind: &str, err: &ExprError) -> StoreError {
    StoreError::validation(format!("Invalid {kind}: {err}"))
}

fn key_error(err: KeyError) -> StoreError {
    StoreError::validation(err.to_string())
}

fn to_count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
