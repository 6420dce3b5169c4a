//! Placeholder bookkeeping and expression synthesis.
//!
//! Every operation owns one [`Expressions`] instance. Builder methods register
//! `#name` and `:value` placeholders as a side effect and return expression
//! fragments; the owning operation stitches the fragments into condition,
//! filter, key-condition, and update expressions and ships the accumulated
//! maps on the wire request.

use dynopage_model::{AttributeValue, ExpressionAttributeNames, ExpressionAttributeValues};

use crate::codec;
use crate::time::now_millis;
use crate::value::{Record, Value};

/// Attribute stamped with a record's creation time, in epoch milliseconds.
pub const CREATED_AT: &str = "createdAt";
/// Attribute stamped on every write, in epoch milliseconds.
pub const UPDATED_AT: &str = "updatedAt";

/// Boolean connective for multi-clause predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Join {
    /// All clauses must hold.
    And,
    /// Any clause may hold.
    #[default]
    Or,
}

impl Join {
    fn separator(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Accumulated placeholder maps for one operation.
#[derive(Debug, Default)]
pub struct Expressions {
    names: ExpressionAttributeNames,
    values: ExpressionAttributeValues,
    counter: u32,
}

impl Expressions {
    /// A fresh, empty placeholder set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name placeholder for `attr` and return it (`#attr`).
    pub fn add_name(&mut self, attr: &str) -> String {
        self.add_name_aliased(attr, attr)
    }

    /// Register name placeholders for several attributes.
    pub fn add_names<'a, I>(&mut self, attrs: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        attrs.into_iter().map(|attr| self.add_name(attr)).collect()
    }

    /// Register a name placeholder under an explicit alias, so the same
    /// attribute can appear under several tokens within one operation.
    pub fn add_name_aliased(&mut self, alias: &str, attr: &str) -> String {
        let placeholder = format!("#{}", sanitize(alias));
        self.names.insert(placeholder.clone(), attr.to_owned());
        placeholder
    }

    /// Register a value placeholder under an explicit alias and return it
    /// (`:alias`).
    pub fn add_value(&mut self, alias: &str, value: &Value) -> String {
        let placeholder = format!(":{}", sanitize(alias));
        self.values.insert(placeholder.clone(), codec::encode(value));
        placeholder
    }

    /// Register a scalar value placeholder aliased by the scalar's own string
    /// form, so callers can write literal tokens like `:pending` in
    /// hand-assembled expressions. Returns `None` for non-scalar values.
    ///
    /// Two distinct values rendering to the same alias fall back to a
    /// counter-suffixed placeholder instead of silently overwriting.
    pub fn add_bare_value(&mut self, value: &Value) -> Option<String> {
        let raw = match value {
            Value::Str(s) => s.clone(),
            Value::Num(n) => codec::format_number(*n),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        let placeholder = format!(":{}", sanitize(&raw));
        let wire = codec::encode(value);
        match self.values.get(&placeholder) {
            Some(existing) if *existing != wire => Some(self.add_unique_value(&raw, value)),
            _ => {
                self.values.insert(placeholder.clone(), wire);
                Some(placeholder)
            }
        }
    }

    /// Register several scalar value placeholders, skipping non-scalars.
    pub fn add_bare_values<'a, I>(&mut self, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        values
            .into_iter()
            .filter_map(|v| self.add_bare_value(v))
            .collect()
    }

    /// Register a value placeholder aliased by the scalar's string form when
    /// possible, falling back to a unique `prefix`-based token for
    /// non-scalars.
    pub fn add_value_auto(&mut self, prefix: &str, value: &Value) -> String {
        match self.add_bare_value(value) {
            Some(placeholder) => placeholder,
            None => self.add_unique_value(prefix, value),
        }
    }

    /// Register a value placeholder whose token is unique within this
    /// operation (`:prefix_<n>`).
    pub fn add_unique_value(&mut self, prefix: &str, value: &Value) -> String {
        let placeholder = format!(":{}_{}", sanitize(prefix), self.counter);
        self.counter += 1;
        self.values.insert(placeholder.clone(), codec::encode(value));
        placeholder
    }

    /// Rewrite a dotted, possibly indexed attribute path into placeholder
    /// form, registering a name placeholder per segment.
    ///
    /// `deep.list[3]` becomes `#deep.#list[3]`.
    pub fn tokenize_path(&mut self, path: &str) -> String {
        path.split('.')
            .map(|segment| match segment.find('[') {
                Some(at) => {
                    let (attr, indexes) = segment.split_at(at);
                    format!("{}{indexes}", self.add_name(attr))
                }
                None => self.add_name(segment),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `attribute_exists(path)` predicate.
    pub fn attr_exists(&mut self, path: &str) -> String {
        let name = self.tokenize_path(path);
        format!("attribute_exists({name})")
    }

    /// `attribute_not_exists(path)` predicate.
    pub fn attr_not_exists(&mut self, path: &str) -> String {
        let name = self.tokenize_path(path);
        format!("attribute_not_exists({name})")
    }

    /// Assignment clause appending `value` to the list at `path`, creating
    /// the list when absent. Scalars are coerced to single-element lists.
    /// With `prepend`, the new elements land in front instead.
    pub fn append_list(&mut self, path: &str, value: Value, prepend: bool) -> String {
        let name = self.tokenize_path(path);
        let list = match value {
            Value::List(_) => value,
            other => Value::List(vec![other]),
        };
        let placeholder = self.add_unique_value(leaf_of(path), &list);
        // Shared across all append clauses of one operation.
        self.values
            .entry(":emptyList".to_owned())
            .or_insert_with(|| AttributeValue::L(Vec::new()));
        if prepend {
            format!("{name} = list_append({placeholder}, if_not_exists({name}, :emptyList))")
        } else {
            format!("{name} = list_append(if_not_exists({name}, :emptyList), {placeholder})")
        }
    }

    /// Assignment clause setting `path` only when it has no value yet.
    pub fn if_not_exists(&mut self, path: &str, value: &Value) -> String {
        let name = self.tokenize_path(path);
        let placeholder = self.add_unique_value(leaf_of(path), value);
        format!("{name} = if_not_exists({name}, {placeholder})")
    }

    /// Parenthesized group of `contains(path, :v)` predicates, one per value,
    /// joined by `join`. Returns `None` when `values` is empty, which callers
    /// must treat as "no filter contributed".
    pub fn contains(&mut self, path: &str, values: &[Value], join: Join) -> Option<String> {
        if values.is_empty() {
            return None;
        }
        let name = self.tokenize_path(path);
        let clauses: Vec<String> = values
            .iter()
            .map(|value| {
                let placeholder = self.add_unique_value(leaf_of(path), value);
                format!("contains({name}, {placeholder})")
            })
            .collect();
        Some(format!("({})", clauses.join(join.separator())))
    }

    /// Range predicate over `path`: `BETWEEN` with both bounds, a one-sided
    /// `>=` / `<=` with one, `None` with neither. Bounds are explicit options
    /// so a legitimate zero bound is never mistaken for "absent".
    pub fn between(&mut self, path: &str, min: Option<&Value>, max: Option<&Value>) -> Option<String> {
        match (min, max) {
            (None, None) => None,
            (Some(min), Some(max)) => {
                let name = self.tokenize_path(path);
                let low = self.add_unique_value("min", min);
                let high = self.add_unique_value("max", max);
                Some(format!("{name} BETWEEN {low} AND {high}"))
            }
            (Some(min), None) => {
                let name = self.tokenize_path(path);
                let low = self.add_unique_value("min", min);
                Some(format!("{name} >= {low}"))
            }
            (None, Some(max)) => {
                let name = self.tokenize_path(path);
                let high = self.add_unique_value("max", max);
                Some(format!("{name} <= {high}"))
            }
        }
    }

    /// Comma-joined assignment list for a record's attributes, in attribute
    /// name order, skipping the attributes named in `skip` plus the timestamp
    /// pair (which the appended [`Expressions::timestamp`] clause covers when
    /// `timestamp` is set). Attributes listed in `keep_existing` assign only
    /// when currently absent. Returns `None` when nothing is assigned.
    pub fn update(
        &mut self,
        record: &Record,
        skip: &[&str],
        keep_existing: &[String],
        timestamp: bool,
    ) -> Option<String> {
        let mut clauses = Vec::with_capacity(record.len());
        for (attr, value) in record {
            if skip.iter().any(|s| s == attr) || attr == CREATED_AT || attr == UPDATED_AT {
                continue;
            }
            let name = self.add_name(attr);
            let placeholder = self.add_value(attr, value);
            if keep_existing.iter().any(|f| f == attr) {
                clauses.push(format!("{name} = if_not_exists({name}, {placeholder})"));
            } else {
                clauses.push(format!("{name} = {placeholder}"));
            }
        }
        if timestamp {
            clauses.push(self.timestamp());
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(", "))
        }
    }

    /// Timestamp maintenance clause: sets `createdAt` only on first write and
    /// `updatedAt` always, both to a shared `:now`. Safe to call repeatedly
    /// within one operation; the first registered `:now` wins.
    pub fn timestamp(&mut self) -> String {
        let created = self.add_name(CREATED_AT);
        let updated = self.add_name(UPDATED_AT);
        self.values
            .entry(":now".to_owned())
            .or_insert_with(|| AttributeValue::N(codec::format_number(now_millis())));
        format!("{created} = if_not_exists({created}, :now), {updated} = :now")
    }

    /// The accumulated name placeholders.
    #[must_use]
    pub fn names(&self) -> &ExpressionAttributeNames {
        &self.names
    }

    /// The accumulated value placeholders.
    #[must_use]
    pub fn values(&self) -> &ExpressionAttributeValues {
        &self.values
    }

    /// Whether no placeholder of either kind has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.values.is_empty()
    }

    /// Surrender both maps for attachment to a wire request.
    #[must_use]
    pub fn into_parts(self) -> (ExpressionAttributeNames, ExpressionAttributeValues) {
        (self.names, self.values)
    }
}

/// Restrict a placeholder token to the store's allowed alphabet.
fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "v".to_owned() } else { cleaned }
}

/// Last path segment without any positional index, used as a placeholder
/// prefix.
fn leaf_of(path: &str) -> &str {
    let leaf = path.rsplit('.').next().unwrap_or(path);
    leaf.split('[').next().unwrap_or(leaf)
}
