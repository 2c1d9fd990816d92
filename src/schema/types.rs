//! Entity index specification
//!
//! Declared field types are classified once, when the spec is built, into
//! the index structure that serves them. Instance data never changes the
//! classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity field, always filterable
pub const ID_FIELD: &str = "id";

/// Modification time field, always sorted-indexed and sortable
pub const UPDATED_FIELD: &str = "updated";

/// Declared field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point
    Float,
    /// Boolean
    Boolean,
    /// Point in time
    Timestamp,
    /// Nested object (stored, never indexed)
    Object,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Object => "object",
        }
    }

    /// Index structure serving this type
    pub fn class(&self) -> FieldClass {
        match self {
            FieldType::Integer | FieldType::Float | FieldType::Timestamp => FieldClass::Numeric,
            FieldType::String | FieldType::Boolean | FieldType::Object => FieldClass::Discrete,
        }
    }
}

/// Index structure used for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldClass {
    /// One set per distinct value
    Discrete,
    /// One sorted set per field, scored by value
    Numeric,
}

/// A declared field and its index flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether predicates may reference the field
    #[serde(default)]
    pub filterable: bool,
    /// Whether results may be ordered by the field
    #[serde(default)]
    pub sortable: bool,
}

impl FieldDef {
    /// Create a field with no index flags
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            filterable: false,
            sortable: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::new(FieldType::Timestamp)
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    /// Mark the field filterable
    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    /// Mark the field sortable
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Index structure serving this field
    pub fn class(&self) -> FieldClass {
        self.field_type.class()
    }
}

/// Immutable per-entity index description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIndexSpec {
    /// Entity name, the first segment of every key
    pub entity: String,
    /// Declared fields
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl EntityIndexSpec {
    /// Create a spec with no declared fields
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field
    pub fn with_field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Checks if predicates may reference a field (`id` always may)
    pub fn is_filterable(&self, field: &str) -> bool {
        field == ID_FIELD
            || field == UPDATED_FIELD
            || self.fields.get(field).is_some_and(|f| f.filterable)
    }

    /// Checks if results may be sorted by a field
    pub fn is_sortable(&self, field: &str) -> bool {
        field == ID_FIELD
            || field == UPDATED_FIELD
            || self.fields.get(field).is_some_and(|f| f.sortable)
    }

    /// Checks if a field is served by a sorted index
    pub fn is_numeric(&self, field: &str) -> bool {
        self.class_of(field) == FieldClass::Numeric
    }

    /// Index class of a field. Undeclared fields are discrete.
    pub fn class_of(&self, field: &str) -> FieldClass {
        match field {
            ID_FIELD => FieldClass::Discrete,
            UPDATED_FIELD => FieldClass::Numeric,
            _ => self
                .fields
                .get(field)
                .map(FieldDef::class)
                .unwrap_or(FieldClass::Discrete),
        }
    }

    /// Declared filterable payload fields, in name order.
    ///
    /// The implicit `id` and `updated` indices are not listed; they come from
    /// the item envelope, not the payload.
    pub fn filterable_fields(&self) -> impl Iterator<Item = (&str, FieldClass)> {
        self.fields
            .iter()
            .filter(|(name, def)| {
                def.filterable && name.as_str() != ID_FIELD && name.as_str() != UPDATED_FIELD
            })
            .map(|(name, def)| (name.as_str(), def.class()))
    }

    /// Declared sortable payload fields, in name order
    pub fn sortable_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(name, def)| {
                def.sortable && name.as_str() != ID_FIELD && name.as_str() != UPDATED_FIELD
            })
            .map(|(name, _)| name.as_str())
    }
}
