//! Item codec
//!
//! Maps an item to the flat string hash stored under its key, and back.
//!
//! Hash layout:
//! - `__id__` - identity
//! - `__etag__` - version token
//! - `__updated__` - modification time, epoch nanoseconds
//! - `__payload__` - type-tagged JSON of the full payload
//! - one field per sortable payload field, read by server-side sorts

use chrono::DateTime;
use std::collections::BTreeMap;

use super::value::{Item, Value};
use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::schema::{EntityIndexSpec, FieldClass, ID_FIELD, UPDATED_FIELD};

/// Hash field holding the identity
pub const ID_HASH_FIELD: &str = "__id__";
/// Hash field holding the version token
pub const ETAG_HASH_FIELD: &str = "__etag__";
/// Hash field holding the modification time
pub const UPDATED_HASH_FIELD: &str = "__updated__";
/// Hash field holding the payload blob
pub const PAYLOAD_HASH_FIELD: &str = "__payload__";

/// Hash fields fetched per matched item, in decode order
pub const FIELD_LIST: [&str; 4] = [
    ID_HASH_FIELD,
    ETAG_HASH_FIELD,
    UPDATED_HASH_FIELD,
    PAYLOAD_HASH_FIELD,
];

/// An encoded item ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Storage hash key
    pub key: String,
    /// Field/value pairs, envelope first
    pub fields: Vec<(String, String)>,
}

/// Encodes and decodes items of one entity
#[derive(Debug, Clone, Copy)]
pub struct ItemCodec<'a> {
    spec: &'a EntityIndexSpec,
}

impl<'a> ItemCodec<'a> {
    /// Creates a codec for the given entity
    pub fn new(spec: &'a EntityIndexSpec) -> Self {
        Self { spec }
    }

    /// Storage key of an item
    pub fn item_key(&self, item: &Item) -> String {
        keys::item_key(self.spec.entity(), &item.id)
    }

    /// Hash field a sort on `field` reads
    pub fn sort_hash_field(field: &str) -> &str {
        match field {
            ID_FIELD => ID_HASH_FIELD,
            UPDATED_FIELD => UPDATED_HASH_FIELD,
            other => other,
        }
    }

    /// Rejects ids whose record key would land on another key of the
    /// entity: the all-ids set, a sorted index, a discrete index or an
    /// auxiliary list.
    pub fn check_id(&self, id: &str) -> StoreResult<()> {
        let reject = |what: &str| {
            Err(StoreError::invalid_value(format!(
                "id '{}' collides with {}",
                id, what
            )))
        };

        if id.is_empty() {
            return Err(StoreError::invalid_value("id is empty"));
        }
        if id == keys::ALL_IDS_SUFFIX {
            return reject("the all-ids set");
        }
        if id.ends_with(keys::AUX_SET_LIST_SUFFIX) || id.ends_with(keys::AUX_ZSET_LIST_SUFFIX) {
            return reject("an auxiliary index list");
        }
        if id == UPDATED_FIELD {
            return reject("the modification-time index");
        }
        if id.starts_with(&format!("{}:", ID_FIELD)) {
            return reject("the identity index");
        }
        for (field, class) in self.spec.filterable_fields() {
            match class {
                FieldClass::Numeric if id == field => {
                    return reject(&format!("the sorted index of '{}'", field))
                }
                FieldClass::Discrete if id.starts_with(&format!("{}:", field)) => {
                    return reject(&format!("the discrete indices of '{}'", field))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Encodes an item into its storage record.
    pub fn encode(&self, item: &Item) -> StoreResult<Record> {
        self.check_id(&item.id)?;
        for (name, value) in &item.payload {
            if FIELD_LIST.contains(&name.as_str()) {
                return Err(StoreError::invalid_value(format!(
                    "payload field '{}' collides with a reserved hash field",
                    name
                )));
            }
            check_finite(name, value)?;
        }

        let updated = item.updated.timestamp_nanos_opt().ok_or_else(|| {
            StoreError::invalid_value(format!("updated time {} out of range", item.updated))
        })?;

        let mut fields = vec![
            (ID_HASH_FIELD.to_string(), item.id.clone()),
            (ETAG_HASH_FIELD.to_string(), item.etag.clone()),
            (UPDATED_HASH_FIELD.to_string(), updated.to_string()),
            (
                PAYLOAD_HASH_FIELD.to_string(),
                serde_json::to_string(&item.payload)?,
            ),
        ];

        for field in self.spec.sortable_fields() {
            if let Some(token) = item.payload.get(field).and_then(Value::sort_token) {
                fields.push((field.to_string(), token));
            }
        }

        Ok(Record {
            key: self.item_key(item),
            fields,
        })
    }

    /// Decodes one item from values fetched in `FIELD_LIST` order.
    pub fn decode(&self, row: &[Option<String>]) -> StoreResult<Item> {
        if row.len() != FIELD_LIST.len() {
            return Err(StoreError::malformed(format!(
                "expected {} fields per item, got {}",
                FIELD_LIST.len(),
                row.len()
            )));
        }

        let id = row_field(row, 0)?.to_string();
        let etag = row_field(row, 1)?.to_string();
        let nanos: i64 = row_field(row, 2)?.parse().map_err(|_| {
            StoreError::malformed(format!("'{}' is not epoch nanoseconds", UPDATED_HASH_FIELD))
        })?;
        let payload: BTreeMap<String, Value> = serde_json::from_str(row_field(row, 3)?)?;

        Ok(Item {
            id,
            etag,
            updated: DateTime::from_timestamp_nanos(nanos),
            payload,
        })
    }
}

fn row_field(row: &[Option<String>], i: usize) -> StoreResult<&str> {
    row[i].as_deref().ok_or_else(|| {
        StoreError::malformed(format!("item is missing hash field '{}'", FIELD_LIST[i]))
    })
}

fn check_finite(name: &str, value: &Value) -> StoreResult<()> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(StoreError::invalid_value(format!(
            "field '{}' holds a non-finite float",
            name
        ))),
        Value::Object(fields) => fields.iter().try_for_each(|(k, v)| check_finite(k, v)),
        _ => Ok(()),
    }
}
