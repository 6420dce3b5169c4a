//! Partitioned, ordered item storage for one table.
//!
//! Items live in a [`DashMap`] keyed by partition value; each partition is a
//! `BTreeMap` ordered by [`SortValue`], so range queries and pagination fall
//! out of the tree ordering. Sort keys compare the way the wire service
//! compares them: numbers numerically, strings and binaries byte-wise, and
//! across types numbers before strings before binaries.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use bytes::Bytes;
use dashmap::DashMap;
use dynopage_model::{AttributeValue, Item, Key, KeySchemaElement, KeyType};

/// A key attribute that cannot be stored or looked up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The item or key map lacks a declared key attribute.
    #[error("missing key attribute: {0}")]
    Missing(String),
    /// A key attribute holds a non-scalar value.
    #[error("key attribute {attr} has non-key type {tag}")]
    WrongType {
        /// The offending attribute.
        attr: String,
        /// Type tag of the value found there.
        tag: &'static str,
    },
    /// String keys must be non-empty.
    #[error("key attribute {0} must not be an empty string")]
    EmptyString(String),
    /// A key schema with no `HASH` element.
    #[error("key schema declares no partition key")]
    NoPartitionKey,
}

/// A sort-key value in storage order.
///
/// `Unkeyed` is the placeholder for tables without a sort attribute, so a
/// partition always holds a tree and single-item partitions need no special
/// casing.
#[derive(Debug, Clone)]
pub enum SortValue {
    /// Numeric sort key, compared by parsed value.
    Num(String),
    /// String sort key, compared byte-wise.
    Str(String),
    /// Binary sort key, compared byte-wise.
    Bin(Bytes),
    /// Placeholder for tables without a sort attribute.
    Unkeyed,
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Num(_) => 0,
            Self::Str(_) => 1,
            Self::Bin(_) => 2,
            Self::Unkeyed => 3,
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => compare_numeric(a, b),
            (Self::Str(a), Self::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::Bin(a), Self::Bin(b)) => a.as_ref().cmp(b.as_ref()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for SortValue {}

fn compare_numeric(a: &str, b: &str) -> std::cmp::Ordering {
    let a = a.parse::<f64>().unwrap_or(f64::NAN);
    let b = b.parse::<f64>().unwrap_or(f64::NAN);
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
}

/// Convert a key attribute into its storage ordering, validating that it is
/// a non-empty scalar.
pub(crate) fn sort_value_from(attr: &str, value: &AttributeValue) -> Result<SortValue, KeyError> {
    match value {
        AttributeValue::S(s) if s.is_empty() => Err(KeyError::EmptyString(attr.to_owned())),
        AttributeValue::S(s) => Ok(SortValue::Str(s.clone())),
        AttributeValue::N(n) => Ok(SortValue::Num(n.clone())),
        AttributeValue::B(b) => Ok(SortValue::Bin(b.clone())),
        other => Err(KeyError::WrongType {
            attr: attr.to_owned(),
            tag: other.type_tag(),
        }),
    }
}

/// The primary key attributes of a table.
#[derive(Debug, Clone)]
pub struct KeySpec {
    /// Partition (`HASH`) attribute name.
    pub partition: String,
    /// Sort (`RANGE`) attribute name, when the table has one.
    pub sort: Option<String>,
}

impl KeySpec {
    /// Build a key spec from wire key-schema elements.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NoPartitionKey`] when no `HASH` element is
    /// present.
    pub fn from_elements(elements: &[KeySchemaElement]) -> Result<Self, KeyError> {
        let mut partition = None;
        let mut sort = None;
        for element in elements {
            match element.key_type {
                KeyType::Hash => partition = Some(element.attribute_name.clone()),
                KeyType::Range => sort = Some(element.attribute_name.clone()),
            }
        }
        Ok(Self {
            partition: partition.ok_or(KeyError::NoPartitionKey)?,
            sort,
        })
    }
}

/// A secondary index over the same items.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Index name, matched against `index_name` on queries.
    pub name: String,
    /// Index partition attribute.
    pub partition: String,
    /// Index sort attribute, when the index has one.
    pub sort: Option<String>,
}

/// A sort-key constraint extracted from a key condition expression.
#[derive(Debug, Clone)]
pub enum SortCondition {
    /// Exactly this sort value.
    Eq(SortValue),
    /// Strictly below.
    Lt(SortValue),
    /// At or below.
    Le(SortValue),
    /// Strictly above.
    Gt(SortValue),
    /// At or above.
    Ge(SortValue),
    /// Inclusive on both ends.
    Between(SortValue, SortValue),
    /// String sort keys starting with this prefix.
    BeginsWith(String),
}

/// Extract `(partition value, sort value)` from an item or key map.
pub(crate) fn extract_key(
    keys: &KeySpec,
    map: &Key,
) -> Result<(AttributeValue, SortValue), KeyError> {
    let partition = map
        .get(&keys.partition)
        .ok_or_else(|| KeyError::Missing(keys.partition.clone()))?;
    sort_value_from(&keys.partition, partition)?;
    let sort = match &keys.sort {
        Some(attr) => {
            let value = map.get(attr).ok_or_else(|| KeyError::Missing(attr.clone()))?;
            sort_value_from(attr, value)?
        }
        None => SortValue::Unkeyed,
    };
    Ok((partition.clone(), sort))
}

/// All items of one table, partitioned and sorted.
#[derive(Debug)]
pub struct TableData {
    name: String,
    keys: KeySpec,
    indexes: Vec<IndexSpec>,
    partitions: DashMap<AttributeValue, BTreeMap<SortValue, Item>>,
    count: AtomicU64,
}

impl TableData {
    /// Create empty storage for a table.
    #[must_use]
    pub fn new(name: impl Into<String>, keys: KeySpec, indexes: Vec<IndexSpec>) -> Self {
        Self {
            name: name.into(),
            keys,
            indexes,
            partitions: DashMap::new(),
            count: AtomicU64::new(0),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key attributes.
    #[must_use]
    pub fn keys(&self) -> &KeySpec {
        &self.keys
    }

    /// Look up a secondary index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.count.load(AtomicOrdering::Relaxed)
    }

    /// Whether the table holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace an item, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the item lacks valid key attributes.
    pub fn put(&self, item: Item) -> Result<Option<Item>, KeyError> {
        let (partition, sort) = extract_key(&self.keys, &item)?;
        let previous = self.partitions.entry(partition).or_default().insert(sort, item);
        if previous.is_none() {
            self.count.fetch_add(1, AtomicOrdering::Relaxed);
        }
        Ok(previous)
    }

    /// Fetch an item by its full primary key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key map is malformed.
    pub fn get(&self, key: &Key) -> Result<Option<Item>, KeyError> {
        let (partition, sort) = extract_key(&self.keys, key)?;
        Ok(self
            .partitions
            .get(&partition)
            .and_then(|tree| tree.get(&sort).cloned()))
    }

    /// Remove an item by key, returning it. Emptied partitions are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key map is malformed.
    pub fn remove(&self, key: &Key) -> Result<Option<Item>, KeyError> {
        let (partition, sort) = extract_key(&self.keys, key)?;
        let removed = {
            let Some(mut tree) = self.partitions.get_mut(&partition) else {
                return Ok(None);
            };
            tree.remove(&sort)
        };
        if removed.is_some() {
            self.count.fetch_sub(1, AtomicOrdering::Relaxed);
            self.partitions.remove_if(&partition, |_, tree| tree.is_empty());
        }
        Ok(removed)
    }

    /// Query one partition in sort order.
    ///
    /// Returns up to `limit` items plus the key to resume from. The resume
    /// key is only present when a further matching item exists, so an
    /// exactly-full final page comes back without one.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the start key is malformed.
    pub fn query(
        &self,
        partition_value: &AttributeValue,
        condition: Option<&SortCondition>,
        forward: bool,
        limit: usize,
        start: Option<&Key>,
    ) -> Result<(Vec<Item>, Option<Key>), KeyError> {
        let start_sort = match start {
            Some(key) => Some(extract_key(&self.keys, key)?.1),
            None => None,
        };
        let (lower, upper, prefix) = condition_bounds(condition);
        let (lower, upper) = narrow_to_start(lower, upper, start_sort, forward);
        if range_is_empty(&lower, &upper) {
            return Ok((Vec::new(), None));
        }
        let Some(partition) = self.partitions.get(partition_value) else {
            return Ok((Vec::new(), None));
        };

        let mut items = Vec::new();
        let mut truncated = false;
        let range = partition.range((lower, upper));
        let entries: Box<dyn Iterator<Item = (&SortValue, &Item)>> = if forward {
            Box::new(range)
        } else {
            Box::new(range.rev())
        };
        for (sort, item) in entries {
            if let Some(prefix) = &prefix {
                // The computed upper bound can overshoot, so re-check.
                if !matches!(sort, SortValue::Str(s) if s.starts_with(prefix.as_str())) {
                    continue;
                }
            }
            if items.len() == limit {
                truncated = true;
                break;
            }
            items.push(item.clone());
        }
        let last_key = if truncated {
            items.last().map(|item| self.primary_key_of(item))
        } else {
            None
        };
        Ok((items, last_key))
    }

    /// Scan the whole table in a stable order: partitions by key order, then
    /// items by sort order within each partition.
    ///
    /// With `segments = Some((segment, total))` only partitions hashing to
    /// that segment are visited, so parallel segment scans cover the table
    /// disjointly.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the start key is malformed.
    pub fn scan(
        &self,
        limit: usize,
        start: Option<&Key>,
        segments: Option<(u64, u64)>,
    ) -> Result<(Vec<Item>, Option<Key>), KeyError> {
        let mut ordered: Vec<(SortValue, AttributeValue)> = Vec::new();
        for entry in &self.partitions {
            if let Some((segment, total)) = segments {
                if partition_segment(entry.key(), total) != segment {
                    continue;
                }
            }
            let order = sort_value_from(&self.keys.partition, entry.key())?;
            ordered.push((order, entry.key().clone()));
        }
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        let mut all: Vec<(AttributeValue, SortValue, Item)> = Vec::new();
        for (_, partition_value) in &ordered {
            if let Some(tree) = self.partitions.get(partition_value) {
                for (sort, item) in tree.iter() {
                    all.push((partition_value.clone(), sort.clone(), item.clone()));
                }
            }
        }

        // A stale cursor (the item was deleted) restarts from the top.
        let start_idx = match start {
            Some(key) => {
                let (partition, sort) = extract_key(&self.keys, key)?;
                all.iter()
                    .position(|(p, s, _)| *p == partition && *s == sort)
                    .map_or(0, |pos| pos + 1)
            }
            None => 0,
        };

        let end = start_idx.saturating_add(limit).min(all.len());
        let truncated = start_idx.saturating_add(limit) < all.len();
        let items: Vec<Item> = all[start_idx.min(all.len())..end]
            .iter()
            .map(|(_, _, item)| item.clone())
            .collect();
        let last_key = if truncated {
            items.last().map(|item| self.primary_key_of(item))
        } else {
            None
        };
        Ok((items, last_key))
    }

    /// Query a secondary index partition in index sort order.
    ///
    /// The index is sparse: items missing the index partition attribute, or
    /// missing a declared index sort attribute, are invisible to it. Resume
    /// keys carry both the index keys and the primary keys; resumption is by
    /// ordering, so it survives the cursor item being deleted.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the start key is malformed.
    pub fn query_index(
        &self,
        index: &IndexSpec,
        partition_value: &AttributeValue,
        condition: Option<&SortCondition>,
        forward: bool,
        limit: usize,
        start: Option<&Key>,
    ) -> Result<(Vec<Item>, Option<Key>), KeyError> {
        let mut entries: Vec<(SortValue, SortValue, SortValue, Item)> = Vec::new();
        for partition in &self.partitions {
            let primary_partition = sort_value_from(&self.keys.partition, partition.key())?;
            for (primary_sort, item) in partition.value() {
                if item.get(&index.partition) != Some(partition_value) {
                    continue;
                }
                let index_sort = match &index.sort {
                    Some(attr) => match item.get(attr).map(|v| sort_value_from(attr, v)) {
                        Some(Ok(sort)) => sort,
                        // Missing or non-scalar keeps the item out of the index.
                        Some(Err(_)) | None => continue,
                    },
                    None => SortValue::Unkeyed,
                };
                if !sort_condition_matches(condition, &index_sort) {
                    continue;
                }
                entries.push((
                    index_sort,
                    primary_partition.clone(),
                    primary_sort.clone(),
                    item.clone(),
                ));
            }
        }
        entries.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        if !forward {
            entries.reverse();
        }

        let cursor = match start {
            Some(key) => {
                let (partition, primary_sort) = extract_key(&self.keys, key)?;
                let index_sort = match &index.sort {
                    Some(attr) => {
                        let value = key
                            .get(attr)
                            .ok_or_else(|| KeyError::Missing(attr.clone()))?;
                        sort_value_from(attr, value)?
                    }
                    None => SortValue::Unkeyed,
                };
                Some((
                    index_sort,
                    sort_value_from(&self.keys.partition, &partition)?,
                    primary_sort,
                ))
            }
            None => None,
        };

        let mut items = Vec::new();
        let mut truncated = false;
        for (index_sort, primary_partition, primary_sort, item) in entries {
            if let Some((ci, cp, cs)) = &cursor {
                let position = (&index_sort, &primary_partition, &primary_sort);
                let behind = if forward {
                    position <= (ci, cp, cs)
                } else {
                    position >= (ci, cp, cs)
                };
                if behind {
                    continue;
                }
            }
            if items.len() == limit {
                truncated = true;
                break;
            }
            items.push(item);
        }
        let last_key = if truncated {
            items.last().map(|item| self.index_key_of(index, item))
        } else {
            None
        };
        Ok((items, last_key))
    }

    /// The primary key attributes of an item, as a key map.
    pub(crate) fn primary_key_of(&self, item: &Item) -> Key {
        let mut key = Key::new();
        if let Some(value) = item.get(&self.keys.partition) {
            key.insert(self.keys.partition.clone(), value.clone());
        }
        if let Some(attr) = &self.keys.sort {
            if let Some(value) = item.get(attr) {
                key.insert(attr.clone(), value.clone());
            }
        }
        key
    }

    /// Index resume key: primary keys plus the index keys, deduplicated.
    fn index_key_of(&self, index: &IndexSpec, item: &Item) -> Key {
        let mut key = self.primary_key_of(item);
        if let Some(value) = item.get(&index.partition) {
            key.insert(index.partition.clone(), value.clone());
        }
        if let Some(attr) = &index.sort {
            if let Some(value) = item.get(attr) {
                key.insert(attr.clone(), value.clone());
            }
        }
        key
    }
}

type SortBounds = (Bound<SortValue>, Bound<SortValue>, Option<String>);

fn condition_bounds(condition: Option<&SortCondition>) -> SortBounds {
    match condition {
        None => (Bound::Unbounded, Bound::Unbounded, None),
        Some(SortCondition::Eq(v)) => {
            (Bound::Included(v.clone()), Bound::Included(v.clone()), None)
        }
        Some(SortCondition::Lt(v)) => (Bound::Unbounded, Bound::Excluded(v.clone()), None),
        Some(SortCondition::Le(v)) => (Bound::Unbounded, Bound::Included(v.clone()), None),
        Some(SortCondition::Gt(v)) => (Bound::Excluded(v.clone()), Bound::Unbounded, None),
        Some(SortCondition::Ge(v)) => (Bound::Included(v.clone()), Bound::Unbounded, None),
        Some(SortCondition::Between(lo, hi)) => (
            Bound::Included(lo.clone()),
            Bound::Included(hi.clone()),
            None,
        ),
        Some(SortCondition::BeginsWith(prefix)) => (
            Bound::Included(SortValue::Str(prefix.clone())),
            prefix_upper_bound(prefix).map_or(Bound::Unbounded, Bound::Excluded),
            Some(prefix.clone()),
        ),
    }
}

/// Narrow the range so iteration resumes strictly past the cursor.
fn narrow_to_start(
    lower: Bound<SortValue>,
    upper: Bound<SortValue>,
    start: Option<SortValue>,
    forward: bool,
) -> (Bound<SortValue>, Bound<SortValue>) {
    let Some(start) = start else {
        return (lower, upper);
    };
    if forward {
        let narrowed = match &lower {
            Bound::Unbounded => true,
            Bound::Included(bound) | Bound::Excluded(bound) => start >= *bound,
        };
        if narrowed {
            (Bound::Excluded(start), upper)
        } else {
            (lower, upper)
        }
    } else {
        let narrowed = match &upper {
            Bound::Unbounded => true,
            Bound::Included(bound) | Bound::Excluded(bound) => start <= *bound,
        };
        if narrowed {
            (lower, Bound::Excluded(start))
        } else {
            (lower, upper)
        }
    }
}

/// `BTreeMap::range` panics on inverted bounds, so detect them up front.
fn range_is_empty(lower: &Bound<SortValue>, upper: &Bound<SortValue>) -> bool {
    match (lower, upper) {
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b))
        | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
        _ => false,
    }
}

/// Smallest string above every string with this prefix, when one exists in
/// valid UTF-8. Callers still filter by prefix.
fn prefix_upper_bound(prefix: &str) -> Option<SortValue> {
    let mut bytes = prefix.as_bytes().to_vec();
    while matches!(bytes.last(), Some(&0xFF)) {
        bytes.pop();
    }
    let last = bytes.last_mut()?;
    *last += 1;
    String::from_utf8(bytes).ok().map(SortValue::Str)
}

fn sort_condition_matches(condition: Option<&SortCondition>, value: &SortValue) -> bool {
    match condition {
        None => true,
        Some(SortCondition::Eq(v)) => value == v,
        Some(SortCondition::Lt(v)) => value < v,
        Some(SortCondition::Le(v)) => value <= v,
        Some(SortCondition::Gt(v)) => value > v,
        Some(SortCondition::Ge(v)) => value >= v,
        Some(SortCondition::Between(lo, hi)) => value >= lo && value <= hi,
        Some(SortCondition::BeginsWith(prefix)) => {
            matches!(value, SortValue::Str(s) if s.starts_with(prefix.as_str()))
        }
    }
}

/// Which scan segment a partition belongs to.
fn partition_segment(partition_value: &AttributeValue, total: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    partition_value.hash(&mut hasher);
    hasher.finish() % total
}
