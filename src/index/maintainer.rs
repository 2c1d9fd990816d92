//! Index Maintainer
//!
//! Computes which index structures an item belongs to and emits the steps
//! that add it to, or remove it from, all of them.
//!
//! # API
//!
//! - `discrete_keys(item)` - Set indices the item belongs to
//! - `sorted_keys(item)` - Sorted indices and the item's score in each
//! - `apply(steps, item, mode)` - Append add/remove steps to a batch
//!
//! Every record also carries two auxiliary lists naming the indices it was
//! added to. Removal sweeps those lists server-side, so stale entries left
//! by a caller holding an outdated pre-image still get cleaned up.

use std::collections::BTreeMap;

use tracing::warn;

use crate::item::{Item, Value};
use crate::keys::{self, IndexKind};
use crate::schema::{EntityIndexSpec, FieldClass, ID_FIELD, UPDATED_FIELD};
use crate::script::{Command, Step};

/// Direction of an index update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Add the record to its indices
    Add,
    /// Remove the record from its indices
    Remove,
}

/// Derives index membership for one entity
#[derive(Debug, Clone, Copy)]
pub struct IndexMaintainer<'a> {
    spec: &'a EntityIndexSpec,
}

impl<'a> IndexMaintainer<'a> {
    /// Creates a maintainer for the given entity
    pub fn new(spec: &'a EntityIndexSpec) -> Self {
        Self { spec }
    }

    /// Discrete index keys for the item, the identity index included.
    ///
    /// Object values and values missing from the payload are not indexed.
    pub fn discrete_keys(&self, item: &Item) -> Vec<String> {
        let entity = self.spec.entity();
        let mut result = vec![keys::set_key(entity, ID_FIELD, &item.id)];

        for (field, class) in self.spec.filterable_fields() {
            if class != FieldClass::Discrete {
                continue;
            }
            let Some(value) = item.get(field) else {
                continue;
            };
            match value.index_token() {
                Some(token) => result.push(keys::set_key(entity, field, &token)),
                None => warn!(
                    event = "INDEX_VALUE_SKIPPED",
                    entity,
                    id = %item.id,
                    field,
                    value_type = value.type_name(),
                    "value has no discrete index token"
                ),
            }
        }

        result
    }

    /// Sorted index keys for the item with its score in each, the
    /// modification-time index included.
    ///
    /// A non-numeric value on a numeric field is skipped with a warning.
    pub fn sorted_keys(&self, item: &Item) -> BTreeMap<String, f64> {
        let entity = self.spec.entity();
        let mut result = BTreeMap::new();

        for (field, class) in self.spec.filterable_fields() {
            if class != FieldClass::Numeric {
                continue;
            }
            let Some(value) = item.get(field) else {
                continue;
            };
            match value.score() {
                Some(score) => {
                    result.insert(keys::zset_key(entity, field), score);
                }
                None => warn!(
                    event = "INDEX_VALUE_SKIPPED",
                    entity,
                    id = %item.id,
                    field,
                    value_type = value.type_name(),
                    "non-numeric value on a numeric field"
                ),
            }
        }

        let updated = Value::Timestamp(item.updated);
        if let Some(score) = updated.score() {
            result.insert(keys::zset_key(entity, UPDATED_FIELD), score);
        }

        result
    }

    /// Appends the steps that add the item to, or remove it from, every
    /// index it belongs to.
    pub fn apply(&self, steps: &mut Vec<Step>, item: &Item, mode: IndexMode) {
        let record = keys::item_key(self.spec.entity(), &item.id);
        let discrete = self.discrete_keys(item);
        let sorted = self.sorted_keys(item);

        match mode {
            IndexMode::Add => {
                for key in &discrete {
                    steps.push(Step::Exec(Command::SAdd {
                        key: key.clone(),
                        members: vec![record.clone()],
                    }));
                }
                for (key, score) in &sorted {
                    steps.push(Step::Exec(Command::ZAdd {
                        key: key.clone(),
                        score: *score,
                        member: record.clone(),
                    }));
                }
                if !discrete.is_empty() {
                    steps.push(Step::Exec(Command::SAdd {
                        key: keys::aux_list_key(&record, IndexKind::Discrete),
                        members: discrete,
                    }));
                }
                if !sorted.is_empty() {
                    steps.push(Step::Exec(Command::SAdd {
                        key: keys::aux_list_key(&record, IndexKind::Sorted),
                        members: sorted.into_keys().collect(),
                    }));
                }
            }
            IndexMode::Remove => {
                for key in discrete {
                    steps.push(Step::Exec(Command::SRem {
                        key,
                        members: vec![record.clone()],
                    }));
                }
                for key in sorted.into_keys() {
                    steps.push(Step::Exec(Command::ZRem {
                        key,
                        member: record.clone(),
                    }));
                }
                steps.push(Step::Unindex { record });
            }
        }
    }
}
