//! Evaluation of parsed expressions against stored items.
//!
//! [`ExprEnv`] bundles an item with the name and value substitution maps and
//! answers the three questions the store asks: does a condition hold
//! ([`ExprEnv::matches`]), what does an item look like after an update
//! ([`ExprEnv::apply`]), and which attributes survive a projection
//! ([`ExprEnv::project`]). Comparisons are typed: numbers compare
//! numerically, strings and binaries byte-wise, and values of different
//! types are only ever unequal.

use std::cmp::Ordering;
use std::collections::HashMap;

use dynopage_model::{
    AttributeValue, ExpressionAttributeNames, ExpressionAttributeValues, Item,
};

use super::ast::{CompareOp, Expr, Operand, Path, Rhs, Seg, Update};
use super::parser::ExprError;

/// Evaluation environment: one item plus the substitution maps that came
/// with the request.
#[derive(Debug, Clone, Copy)]
pub struct ExprEnv<'a> {
    /// The item conditions read from and updates start from.
    pub item: &'a Item,
    /// `#alias` to attribute-name substitutions.
    pub names: &'a ExpressionAttributeNames,
    /// `:token` to value substitutions.
    pub values: &'a ExpressionAttributeValues,
}

impl<'a> ExprEnv<'a> {
    /// Evaluate a condition against the item. Missing attributes make
    /// comparisons false rather than erroring, so `NOT` still behaves.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError`] for unresolved substitutions or operand types
    /// an operation cannot accept.
    pub fn matches(&self, expr: &Expr) -> Result<bool, ExprError> {
        match expr {
            Expr::Compare { op, lhs, rhs } => {
                let (Some(lhs), Some(rhs)) = (self.resolve(lhs)?, self.resolve(rhs)?) else {
                    return Ok(false);
                };
                Ok(compare_values(*op, &lhs, &rhs))
            }
            Expr::Between { probe, low, high } => {
                let (Some(probe), Some(low), Some(high)) =
                    (self.resolve(probe)?, self.resolve(low)?, self.resolve(high)?)
                else {
                    return Ok(false);
                };
                Ok(compare_values(CompareOp::Ge, &probe, &low)
                    && compare_values(CompareOp::Le, &probe, &high))
            }
            Expr::In { probe, choices } => {
                let Some(probe) = self.resolve(probe)? else {
                    return Ok(false);
                };
                for choice in choices {
                    if let Some(choice) = self.resolve(choice)? {
                        if compare_values(CompareOp::Eq, &probe, &choice) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Expr::And(lhs, rhs) => Ok(self.matches(lhs)? && self.matches(rhs)?),
            Expr::Or(lhs, rhs) => Ok(self.matches(lhs)? || self.matches(rhs)?),
            Expr::Not(inner) => Ok(!self.matches(inner)?),
            Expr::Exists(path) => Ok(self.lookup(path)?.is_some()),
            Expr::NotExists(path) => Ok(self.lookup(path)?.is_none()),
            Expr::BeginsWith(path, operand) => {
                let Some(prefix) = self.resolve(operand)? else {
                    return Ok(false);
                };
                match (&prefix, self.lookup(path)?) {
                    (AttributeValue::S(p), Some(AttributeValue::S(s))) => Ok(s.starts_with(p)),
                    (AttributeValue::B(p), Some(AttributeValue::B(b))) => {
                        Ok(b.starts_with(p.as_ref()))
                    }
                    (AttributeValue::S(_) | AttributeValue::B(_), _) => Ok(false),
                    _ => Err(ExprError::TypeMismatch(
                        "begins_with requires a string or binary prefix".to_owned(),
                    )),
                }
            }
            Expr::Contains(path, operand) => {
                let Some(needle) = self.resolve(operand)? else {
                    return Ok(false);
                };
                let Some(stored) = self.lookup(path)? else {
                    return Ok(false);
                };
                Ok(value_contains(stored, &needle))
            }
        }
    }

    /// Apply an update and return the resulting item. Right-hand sides
    /// resolve against the image the update started from, so
    /// `SET #a = #b, #b = :v` reads the old `#b`.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError`] for unresolved substitutions, missing operands,
    /// or actions applied to values of the wrong type.
    pub fn apply(&self, update: &Update) -> Result<Item, ExprError> {
        let mut next = self.item.clone();
        for assign in &update.set {
            let value = self.resolve_rhs(&assign.rhs)?;
            self.write_path(&mut next, &assign.path, value)?;
        }
        self.apply_removes(&mut next, &update.remove)?;
        for (path, operand) in &update.add {
            self.apply_add(&mut next, path, operand)?;
        }
        for (path, operand) in &update.delete {
            self.apply_delete(&mut next, path, operand)?;
        }
        Ok(next)
    }

    /// Keep only the attributes a projection names. Nested selectors keep
    /// the whole top-level attribute they start from.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError`] when a `#alias` has no substitution.
    pub fn project(&self, paths: &[Path]) -> Result<Item, ExprError> {
        let mut out = Item::new();
        for path in paths {
            let Some(Seg::Attr(head)) = path.segments.first() else {
                continue;
            };
            let name = resolve_name(head, self.names)?;
            if let Some(value) = self.item.get(name) {
                out.insert(name.to_owned(), value.clone());
            }
        }
        Ok(out)
    }

    fn lookup(&self, path: &Path) -> Result<Option<&'a AttributeValue>, ExprError> {
        path_ref(self.item, path, self.names)
    }

    fn resolve(&self, operand: &Operand) -> Result<Option<AttributeValue>, ExprError> {
        match operand {
            Operand::Value(token) => match self.values.get(token) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(ExprError::UnresolvedValue(token.clone())),
            },
            Operand::Path(path) => Ok(self.lookup(path)?.cloned()),
            Operand::Size(path) => match self.lookup(path)? {
                Some(value) => {
                    let len = size_of(value).ok_or_else(|| {
                        ExprError::TypeMismatch(format!(
                            "size() does not apply to a {} value",
                            value.type_tag()
                        ))
                    })?;
                    Ok(Some(AttributeValue::N(len.to_string())))
                }
                None => Ok(None),
            },
        }
    }

    fn require(&self, operand: &Operand) -> Result<AttributeValue, ExprError> {
        self.resolve(operand)?
            .ok_or_else(|| ExprError::Unresolvable(operand.to_string()))
    }

    fn require_number(&self, operand: &Operand) -> Result<f64, ExprError> {
        match self.require(operand)? {
            AttributeValue::N(n) => n
                .parse::<f64>()
                .map_err(|_| ExprError::TypeMismatch(format!("'{n}' is not a valid number"))),
            other => Err(ExprError::TypeMismatch(format!(
                "arithmetic requires numbers, found a {} value",
                other.type_tag()
            ))),
        }
    }

    fn resolve_rhs(&self, rhs: &Rhs) -> Result<AttributeValue, ExprError> {
        match rhs {
            Rhs::Operand(operand) => self.require(operand),
            Rhs::Add(lhs, rhs) => {
                let sum = self.require_number(lhs)? + self.require_number(rhs)?;
                Ok(AttributeValue::N(sum.to_string()))
            }
            Rhs::Sub(lhs, rhs) => {
                let diff = self.require_number(lhs)? - self.require_number(rhs)?;
                Ok(AttributeValue::N(diff.to_string()))
            }
            Rhs::IfNotExists(path, default) => match self.lookup(path)? {
                Some(value) => Ok(value.clone()),
                None => self.require(default),
            },
            Rhs::ListAppend(front, back) => {
                match (self.require(front)?, self.require(back)?) {
                    (AttributeValue::L(mut front), AttributeValue::L(back)) => {
                        front.extend(back);
                        Ok(AttributeValue::L(front))
                    }
                    _ => Err(ExprError::TypeMismatch(
                        "list_append requires two lists".to_owned(),
                    )),
                }
            }
        }
    }

    /// Write a value at a document path, creating intermediate maps as
    /// needed. A list index past the end appends; writes into a container
    /// of the wrong shape are dropped.
    fn write_path(
        &self,
        item: &mut Item,
        path: &Path,
        value: AttributeValue,
    ) -> Result<(), ExprError> {
        let Some((Seg::Attr(head), rest)) = path.segments.split_first() else {
            return Ok(());
        };
        let head = resolve_name(head, self.names)?.to_owned();
        if rest.is_empty() {
            item.insert(head, value);
            return Ok(());
        }
        let mut current = item
            .entry(head)
            .or_insert_with(|| AttributeValue::M(HashMap::new()));
        let Some((last, middle)) = rest.split_last() else {
            return Ok(());
        };
        for seg in middle {
            current = match seg {
                Seg::Attr(name) => {
                    let name = resolve_name(name, self.names)?.to_owned();
                    match current {
                        AttributeValue::M(map) => map
                            .entry(name)
                            .or_insert_with(|| AttributeValue::M(HashMap::new())),
                        _ => return Ok(()),
                    }
                }
                Seg::Index(idx) => match current {
                    AttributeValue::L(list) => match list.get_mut(*idx) {
                        Some(slot) => slot,
                        None => return Ok(()),
                    },
                    _ => return Ok(()),
                },
            };
        }
        match last {
            Seg::Attr(name) => {
                let name = resolve_name(name, self.names)?.to_owned();
                if let AttributeValue::M(map) = current {
                    map.insert(name, value);
                }
            }
            Seg::Index(idx) => {
                if let AttributeValue::L(list) = current {
                    if *idx < list.len() {
                        list[*idx] = value;
                    } else {
                        list.push(value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply REMOVE actions. Index removals are grouped per parent list and
    /// applied highest index first, so every index refers to the list as it
    /// was before the update.
    fn apply_removes(&self, item: &mut Item, paths: &[Path]) -> Result<(), ExprError> {
        let mut list_removals: Vec<(String, Path, usize)> = Vec::new();
        for path in paths {
            match path.segments.last() {
                Some(Seg::Index(idx)) => {
                    let parent = Path {
                        segments: path.segments[..path.segments.len() - 1].to_vec(),
                    };
                    list_removals.push((parent.to_string(), parent, *idx));
                }
                Some(Seg::Attr(_)) => self.remove_at_path(item, path)?,
                None => {}
            }
        }
        list_removals.sort_by(|a, b| a.0.cmp(&b.0).then(b.2.cmp(&a.2)));
        for (_, parent, idx) in &list_removals {
            if let Some(AttributeValue::L(list)) = path_mut(item, parent, self.names)? {
                if *idx < list.len() {
                    list.remove(*idx);
                }
            }
        }
        Ok(())
    }

    fn remove_at_path(&self, item: &mut Item, path: &Path) -> Result<(), ExprError> {
        match path.segments.as_slice() {
            [] | [Seg::Index(_)] => Ok(()),
            [Seg::Attr(name)] => {
                item.remove(resolve_name(name, self.names)?);
                Ok(())
            }
            [parents @ .., last] => {
                let parent = Path {
                    segments: parents.to_vec(),
                };
                let Some(container) = path_mut(item, &parent, self.names)? else {
                    return Ok(());
                };
                match (container, last) {
                    (AttributeValue::M(map), Seg::Attr(name)) => {
                        map.remove(resolve_name(name, self.names)?);
                    }
                    (AttributeValue::L(list), Seg::Index(idx)) => {
                        if *idx < list.len() {
                            list.remove(*idx);
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
        }
    }

    fn apply_add(&self, item: &mut Item, path: &Path, operand: &Operand) -> Result<(), ExprError> {
        let addend = self.require(operand)?;
        if !matches!(
            addend,
            AttributeValue::N(_)
                | AttributeValue::SS(_)
                | AttributeValue::NS(_)
                | AttributeValue::BS(_)
        ) {
            return Err(ExprError::TypeMismatch(format!(
                "ADD supports number and set values, found {}",
                addend.type_tag()
            )));
        }
        let current = path_ref(item, path, self.names)?.cloned();
        let merged = merge_add(current, addend)?;
        self.write_path(item, path, merged)
    }

    /// Apply a DELETE action: drop the named members from a stored set. A
    /// set emptied by the deletion is removed from the item entirely.
    fn apply_delete(
        &self,
        item: &mut Item,
        path: &Path,
        operand: &Operand,
    ) -> Result<(), ExprError> {
        let subtrahend = self.require(operand)?;
        let Some(stored) = path_ref(item, path, self.names)?.cloned() else {
            return Ok(());
        };
        let remaining = match (stored, &subtrahend) {
            (AttributeValue::SS(cur), AttributeValue::SS(del)) => AttributeValue::SS(
                cur.into_iter().filter(|m| !del.contains(m)).collect(),
            ),
            (AttributeValue::NS(cur), AttributeValue::NS(del)) => AttributeValue::NS(
                cur.into_iter()
                    .filter(|m| !del.iter().any(|d| numbers_equal(d, m)))
                    .collect(),
            ),
            (AttributeValue::BS(cur), AttributeValue::BS(del)) => AttributeValue::BS(
                cur.into_iter().filter(|m| !del.contains(m)).collect(),
            ),
            (stored, _) => {
                return Err(ExprError::TypeMismatch(format!(
                    "DELETE requires matching set types, found {} and {}",
                    stored.type_tag(),
                    subtrahend.type_tag()
                )));
            }
        };
        let emptied = match &remaining {
            AttributeValue::SS(s) | AttributeValue::NS(s) => s.is_empty(),
            AttributeValue::BS(s) => s.is_empty(),
            _ => false,
        };
        if emptied {
            self.remove_at_path(item, path)
        } else {
            self.write_path(item, path, remaining)
        }
    }
}

/// Resolve a possibly `#`-aliased attribute name through the substitution
/// map. Bare names pass through unchanged.
///
/// # Errors
///
/// Returns [`ExprError::UnresolvedName`] when an alias has no substitution.
pub fn resolve_name<'n>(
    raw: &'n str,
    names: &'n ExpressionAttributeNames,
) -> Result<&'n str, ExprError> {
    if raw.starts_with('#') {
        names
            .get(raw)
            .map(String::as_str)
            .ok_or_else(|| ExprError::UnresolvedName(raw.to_owned()))
    } else {
        Ok(raw)
    }
}

fn path_ref<'i>(
    item: &'i Item,
    path: &Path,
    names: &ExpressionAttributeNames,
) -> Result<Option<&'i AttributeValue>, ExprError> {
    let Some((Seg::Attr(head), rest)) = path.segments.split_first() else {
        return Ok(None);
    };
    let mut current = item.get(resolve_name(head, names)?);
    for seg in rest {
        let Some(value) = current else {
            return Ok(None);
        };
        current = match seg {
            Seg::Attr(name) => match value {
                AttributeValue::M(map) => map.get(resolve_name(name, names)?),
                _ => None,
            },
            Seg::Index(idx) => match value {
                AttributeValue::L(list) => list.get(*idx),
                _ => None,
            },
        };
    }
    Ok(current)
}

fn path_mut<'i>(
    item: &'i mut Item,
    path: &Path,
    names: &ExpressionAttributeNames,
) -> Result<Option<&'i mut AttributeValue>, ExprError> {
    let Some((Seg::Attr(head), rest)) = path.segments.split_first() else {
        return Ok(None);
    };
    let Some(mut current) = item.get_mut(resolve_name(head, names)?) else {
        return Ok(None);
    };
    for seg in rest {
        current = match seg {
            Seg::Attr(name) => match current {
                AttributeValue::M(map) => match map.get_mut(resolve_name(name, names)?) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            },
            Seg::Index(idx) => match current {
                AttributeValue::L(list) => match list.get_mut(*idx) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            },
        };
    }
    Ok(Some(current))
}

fn compare_values(op: CompareOp, lhs: &AttributeValue, rhs: &AttributeValue) -> bool {
    let ordering = match (lhs, rhs) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (AttributeValue::N(a), AttributeValue::N(b)) => compare_numbers(a, b),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ if std::mem::discriminant(lhs) == std::mem::discriminant(rhs) => {
            // Sets, lists, maps, booleans, and nulls support equality only.
            return match op {
                CompareOp::Eq => lhs == rhs,
                CompareOp::Ne => lhs != rhs,
                _ => false,
            };
        }
        // Values of different types never satisfy an ordering.
        _ => return matches!(op, CompareOp::Ne),
    };
    let Some(ordering) = ordering else {
        return matches!(op, CompareOp::Ne);
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn compare_numbers(a: &str, b: &str) -> Option<Ordering> {
    let (a, b) = (a.parse::<f64>().ok()?, b.parse::<f64>().ok()?);
    a.partial_cmp(&b)
}

fn numbers_equal(a: &str, b: &str) -> bool {
    compare_numbers(a, b) == Some(Ordering::Equal)
}

fn value_contains(haystack: &AttributeValue, needle: &AttributeValue) -> bool {
    match (haystack, needle) {
        (AttributeValue::S(s), AttributeValue::S(sub)) => s.contains(sub.as_str()),
        (AttributeValue::SS(set), AttributeValue::S(member)) => set.contains(member),
        (AttributeValue::NS(set), AttributeValue::N(member)) => {
            set.iter().any(|m| numbers_equal(m, member))
        }
        (AttributeValue::BS(set), AttributeValue::B(member)) => set.contains(member),
        (AttributeValue::L(list), needle) => list.iter().any(|v| v == needle),
        _ => false,
    }
}

fn size_of(value: &AttributeValue) -> Option<usize> {
    match value {
        AttributeValue::S(s) => Some(s.len()),
        AttributeValue::B(b) => Some(b.len()),
        AttributeValue::SS(set) | AttributeValue::NS(set) => Some(set.len()),
        AttributeValue::BS(set) => Some(set.len()),
        AttributeValue::L(list) => Some(list.len()),
        AttributeValue::M(map) => Some(map.len()),
        _ => None,
    }
}

fn merge_add(
    current: Option<AttributeValue>,
    addend: AttributeValue,
) -> Result<AttributeValue, ExprError> {
    let Some(current) = current else {
        return Ok(addend);
    };
    match (current, addend) {
        (AttributeValue::N(cur), AttributeValue::N(inc)) => {
            let cur = cur
                .parse::<f64>()
                .map_err(|_| ExprError::TypeMismatch(format!("'{cur}' is not a valid number")))?;
            let inc = inc
                .parse::<f64>()
                .map_err(|_| ExprError::TypeMismatch(format!("'{inc}' is not a valid number")))?;
            Ok(AttributeValue::N((cur + inc).to_string()))
        }
        (AttributeValue::SS(mut cur), AttributeValue::SS(add)) => {
            for member in add {
                if !cur.contains(&member) {
                    cur.push(member);
                }
            }
            Ok(AttributeValue::SS(cur))
        }
        (AttributeValue::NS(mut cur), AttributeValue::NS(add)) => {
            for member in add {
                if !cur.iter().any(|m| numbers_equal(m, &member)) {
                    cur.push(member);
                }
            }
            Ok(AttributeValue::NS(cur))
        }
        (AttributeValue::BS(mut cur), AttributeValue::BS(add)) => {
            for member in add {
                if !cur.contains(&member) {
                    cur.push(member);
                }
            }
            Ok(AttributeValue::BS(cur))
        }
        (current, addend) => Err(ExprError::TypeMismatch(format!(
            "ADD cannot combine {} with {}",
            addend.type_tag(),
            current.type_tag()
        ))),
    }
}
