//! Table key schemas and index key resolution.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Key attribute names for a table and its secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    partition: String,
    sort: Option<String>,
    indexes: HashMap<String, IndexKeys>,
}

/// Key attribute names for one secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeys {
    partition: String,
    sort: Option<String>,
}

impl Schema {
    /// A schema with the given partition key attribute and no sort key.
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
            indexes: HashMap::new(),
        }
    }

    /// Set the sort key attribute.
    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Register a secondary index by name.
    #[must_use]
    pub fn with_index(mut self, name: impl Into<String>, keys: IndexKeys) -> Self {
        self.indexes.insert(name.into(), keys);
        self
    }

    /// The primary partition key attribute.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The primary sort key attribute, if the table has one.
    #[must_use]
    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    /// The key attributes of a named index.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexKeys> {
        self.indexes.get(name)
    }

    /// Resolve the key attributes a request against this schema targets.
    ///
    /// With no index this is simply the primary keys. A local index (one whose
    /// partition attribute equals the primary partition attribute) inherits
    /// both primary keys and exposes its own sort attribute as a local sort;
    /// any other index is global and its own keys stand alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `index` names an index the
    /// schema does not declare.
    pub fn resolve_keys(&self, index: Option<&str>) -> Result<ResolvedKeys> {
        let Some(name) = index else {
            return Ok(ResolvedKeys {
                partition: self.partition.clone(),
                sort: self.sort.clone(),
                local_sort: None,
            });
        };
        let keys = self
            .index(name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown index: {name}")))?;
        if keys.partition == self.partition {
            Ok(ResolvedKeys {
                partition: self.partition.clone(),
                sort: self.sort.clone(),
                local_sort: keys.sort.clone(),
            })
        } else {
            Ok(ResolvedKeys {
                partition: keys.partition.clone(),
                sort: keys.sort.clone(),
                local_sort: None,
            })
        }
    }

    /// The attributes a pagination cursor must carry for a request against
    /// this schema: the full primary key plus the targeted index's keys,
    /// deduplicated, primary first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `index` names an index the
    /// schema does not declare.
    pub fn cursor_attributes(&self, index: Option<&str>) -> Result<Vec<String>> {
        let mut attrs = vec![self.partition.clone()];
        if let Some(sort) = &self.sort {
            attrs.push(sort.clone());
        }
        if let Some(name) = index {
            let keys = self
                .index(name)
                .ok_or_else(|| Error::invalid_argument(format!("unknown index: {name}")))?;
            if !attrs.iter().any(|a| *a == keys.partition) {
                attrs.push(keys.partition.clone());
            }
            if let Some(sort) = &keys.sort {
                if !attrs.iter().any(|a| a == sort) {
                    attrs.push(sort.clone());
                }
            }
        }
        Ok(attrs)
    }
}

impl IndexKeys {
    /// Index keys with the given partition attribute and no sort attribute.
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    /// Set the index sort attribute.
    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// The index partition key attribute.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The index sort key attribute, if it has one.
    #[must_use]
    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }
}

/// Key attributes resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeys {
    /// Partition key attribute to condition on.
    pub partition: String,
    /// Sort key attribute, if one applies.
    pub sort: Option<String>,
    /// Local index sort attribute, when a local index supplies one on top of
    /// the inherited primary sort.
    pub local_sort: Option<String>,
}

impl ResolvedKeys {
    /// The sort attribute range conditions should use: the local index sort
    /// when present, otherwise the (possibly inherited) sort attribute.
    #[must_use]
    pub fn range_attribute(&self) -> Option<&str> {
        self.local_sort.as_deref().or(self.sort.as_deref())
    }
}
