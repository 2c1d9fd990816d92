//! Shared fixtures for store integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use docdex::schema::FieldDef;
use docdex::{EntityIndexSpec, Item, MemoryEngine, OpContext, Store, StoreConfig, Storer};

pub fn users_spec() -> EntityIndexSpec {
    EntityIndexSpec::new("users")
        .with_field("name", FieldDef::string().filterable().sortable())
        .with_field("age", FieldDef::integer().filterable().sortable())
        .with_field("height", FieldDef::float().filterable().sortable())
        .with_field("male", FieldDef::boolean().filterable())
        .with_field("birth", FieldDef::timestamp().filterable().sortable())
        .with_field("bio", FieldDef::string())
}

pub fn setup() -> (Store, Arc<MemoryEngine>) {
    let engine = Arc::new(MemoryEngine::new());
    let store = Store::new(engine.clone(), users_spec(), StoreConfig::default());
    (store, engine)
}

pub fn ctx() -> OpContext {
    OpContext::new()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn bob() -> Item {
    Item::new("a", "etag-a1")
        .with_updated(at(1))
        .with_field("name", "Bob")
        .with_field("age", 19)
        .with_field("height", 155.3)
        .with_field("male", true)
        .with_field("birth", date(2000, 1, 1))
        .with_field("bio", "likes trains")
}

pub fn linda() -> Item {
    Item::new("b", "etag-b1")
        .with_updated(at(2))
        .with_field("name", "Linda")
        .with_field("age", 7)
        .with_field("height", 120.5)
        .with_field("male", false)
        .with_field("birth", date(2015, 3, 9))
}

pub fn jimmy() -> Item {
    Item::new("c", "etag-c1")
        .with_updated(at(3))
        .with_field("name", "Jimmy")
        .with_field("age", 19)
        .with_field("height", 180.0)
        .with_field("male", true)
        .with_field("birth", date(2001, 7, 30))
}

/// Store seeded with Bob (a), Linda (b) and Jimmy (c)
pub async fn seeded() -> (Store, Arc<MemoryEngine>) {
    let (store, engine) = setup();
    store
        .insert(&ctx(), &[bob(), linda(), jimmy()])
        .await
        .unwrap();
    (store, engine)
}

/// Ids of the items in result order
pub fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

/// Ids sorted, for results whose order is unspecified
pub fn sorted_ids(items: &[Item]) -> Vec<String> {
    let mut ids = ids(items);
    ids.sort();
    ids
}

/// Temporary keys left in the engine
pub fn leftover_temp_keys(engine: &MemoryEngine) -> Vec<String> {
    engine.keys("tmp:*").unwrap()
}
