//! Key naming
//!
//! Pure functions mapping entities, fields and values onto the key grammar
//! shared with any other client of the same store:
//!
//! - `entity:id` - item hash
//! - `entity:field:value` - discrete index (set)
//! - `entity:field` - sorted index (zset)
//! - `entity:ids` - all stored item keys
//! - `<itemKey>:idx_set_list` / `<itemKey>:idx_zset_list` - auxiliary lists
//! - `entity:field:*` - pattern matching every discrete index of a field

/// Suffix of the all-ids set
pub const ALL_IDS_SUFFIX: &str = "ids";

/// Suffix of an item's list of discrete index keys
pub const AUX_SET_LIST_SUFFIX: &str = ":idx_set_list";

/// Suffix of an item's list of sorted index keys
pub const AUX_ZSET_LIST_SUFFIX: &str = ":idx_zset_list";

/// The two index structures an item can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Unordered set per (field, value)
    Discrete,
    /// Sorted set per field, scored by value
    Sorted,
}

/// Key of an item's storage hash. Ex: `users:1234`
pub fn item_key(entity: &str, id: &str) -> String {
    format!("{}:{}", entity, id)
}

/// Key of a discrete index. Ex: `users:hair:brown`
pub fn set_key(entity: &str, field: &str, token: &str) -> String {
    format!("{}:{}:{}", entity, field, token)
}

/// Key of a sorted index. Ex: `users:age`
pub fn zset_key(entity: &str, field: &str) -> String {
    format!("{}:{}", entity, field)
}

/// Key of the all-ids set. Ex: `users:ids`
pub fn all_ids_key(entity: &str) -> String {
    format!("{}:{}", entity, ALL_IDS_SUFFIX)
}

/// Key of an item's auxiliary index-membership list.
pub fn aux_list_key(item_key: &str, kind: IndexKind) -> String {
    match kind {
        IndexKind::Discrete => format!("{}{}", item_key, AUX_SET_LIST_SUFFIX),
        IndexKind::Sorted => format!("{}{}", item_key, AUX_ZSET_LIST_SUFFIX),
    }
}

/// Pattern matching every discrete index of a field. Ex: `users:hair:*`
///
/// Glob metacharacters in the entity and field are escaped so only the
/// trailing `*` is a wildcard.
pub fn field_pattern(entity: &str, field: &str) -> String {
    format!("{}:{}:*", escape_glob(entity), escape_glob(field))
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
