//! Write Tests
//!
//! Tests for insert, update and delete:
//! - Writes are all-or-nothing
//! - Etag guards reject stale writers without side effects
//! - Indices follow the stored state

mod common;

use common::*;
use docdex::keys;
use docdex::{Item, Query, StoreError, Storer};
use pretty_assertions::assert_eq;

async fn all(store: &docdex::Store) -> Vec<Item> {
    let mut items = store.find(&ctx(), &Query::new()).await.unwrap().items;
    items.sort_by(|a, b| a.id.cmp(&b.id));
    items
}

// =============================================================================
// Insert
// =============================================================================

/// Inserted items come back unchanged.
#[tokio::test]
async fn test_insert_round_trip() {
    let (store, _) = seeded().await;
    assert_eq!(all(&store).await, vec![bob(), linda(), jimmy()]);
}

/// Inserting an existing id fails and leaves the stored item alone.
#[tokio::test]
async fn test_insert_existing_id_conflicts() {
    let (store, _) = seeded().await;

    let impostor = Item::new("a", "etag-x").with_field("name", "Mallory");
    let err = store.insert(&ctx(), &[impostor]).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);

    assert_eq!(all(&store).await, vec![bob(), linda(), jimmy()]);
    assert!(store
        .find(&ctx(), &Query::new().filter_eq("name", "Mallory"))
        .await
        .unwrap()
        .is_empty());
}

/// One existing id rejects the whole batch.
#[tokio::test]
async fn test_insert_batch_is_atomic() {
    let (store, engine) = setup();
    store.insert(&ctx(), &[bob()]).await.unwrap();

    let err = store
        .insert(&ctx(), &[linda(), bob(), jimmy()])
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Conflict);

    assert_eq!(all(&store).await, vec![bob()]);
    assert_eq!(engine.hget("users:b", "__id__").unwrap(), None);
    assert!(engine.members("users:name:Linda").unwrap().is_empty());
}

/// The same id twice in one call is a conflict.
#[tokio::test]
async fn test_insert_duplicate_within_batch() {
    let (store, engine) = setup();

    let err = store.insert(&ctx(), &[bob(), bob()]).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);
    assert!(engine.keys("*").unwrap().is_empty());
}

/// Inserting nothing succeeds and writes nothing.
#[tokio::test]
async fn test_insert_empty() {
    let (store, engine) = setup();
    store.insert(&ctx(), &[]).await.unwrap();
    assert!(engine.keys("*").unwrap().is_empty());
}

/// Insert registers the record in every index it belongs to.
#[tokio::test]
async fn test_insert_indexes_fields() {
    let (store, engine) = setup();
    store.insert(&ctx(), &[bob()]).await.unwrap();

    assert_eq!(engine.members("users:ids").unwrap(), vec!["users:a"]);
    assert_eq!(engine.members("users:id:a").unwrap(), vec!["users:a"]);
    assert_eq!(engine.members("users:name:Bob").unwrap(), vec!["users:a"]);
    assert_eq!(engine.members("users:male:true").unwrap(), vec!["users:a"]);
    assert_eq!(engine.score("users:age", "users:a").unwrap(), Some(19.0));
    assert_eq!(engine.score("users:height", "users:a").unwrap(), Some(155.3));
    assert_eq!(engine.score("users:updated", "users:a").unwrap(), Some(1e9));
    assert!(engine.keys("users:bio*").unwrap().is_empty());
}

/// Ids whose record key would land on an index key are rejected before any
/// write.
#[tokio::test]
async fn test_insert_reserved_ids_rejected() {
    let (store, engine) = seeded().await;
    let before = engine.keys("*").unwrap();

    for id in ["ids", "updated", "age", "name:Bob", "id:a", "a:idx_set_list"] {
        let item = Item::new(id, "etag-r1").with_field("name", "Ann");
        let err = store.insert(&ctx(), &[item]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)), "id {:?}", id);
    }

    assert_eq!(engine.keys("*").unwrap(), before);
    assert_eq!(all(&store).await, vec![bob(), linda(), jimmy()]);
}

/// A reserved id fails the same way on an empty store.
#[tokio::test]
async fn test_insert_reserved_id_into_empty_store() {
    let (store, engine) = setup();

    let err = store
        .insert(&ctx(), &[Item::new("ids", "etag-r1").with_field("name", "Ann")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));
    assert!(engine.keys("*").unwrap().is_empty());
    assert!(all(&store).await.is_empty());
}

/// Update and delete apply the same id rules.
#[tokio::test]
async fn test_update_delete_reserved_ids_rejected() {
    let (store, _) = seeded().await;
    let item = Item::new("updated", "etag-r1");

    let err = store.update(&ctx(), &item, &item).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));
    let err = store.delete(&ctx(), &item).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));
    assert_eq!(all(&store).await.len(), 3);
}

/// Ids that merely contain a separator or equal a discrete field name are
/// ordinary.
#[tokio::test]
async fn test_insert_unusual_ids() {
    let (store, _) = seeded().await;
    let odd = ["name", "male", "b:c", "x:name:y"]
        .map(|id| Item::new(id, "etag-o1").with_updated(at(5)).with_field("age", 3));
    store.insert(&ctx(), &odd).await.unwrap();

    let found = store
        .find(&ctx(), &Query::new().filter_eq("age", 3))
        .await
        .unwrap();
    let mut expected = odd.to_vec();
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    let mut items = found.items;
    items.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(items, expected);
}

// =============================================================================
// Update
// =============================================================================

/// A fresh update replaces the item and moves it between indices.
#[tokio::test]
async fn test_update_reindexes() {
    let (store, engine) = seeded().await;

    let renamed = Item::new("a", "etag-a2")
        .with_updated(at(10))
        .with_field("name", "Robert")
        .with_field("age", 20);
    store.update(&ctx(), &renamed, &bob()).await.unwrap();

    let found = store
        .find(&ctx(), &Query::new().filter_eq("name", "Robert"))
        .await
        .unwrap();
    assert_eq!(found.items, vec![renamed]);

    assert!(store
        .find(&ctx(), &Query::new().filter_eq("name", "Bob"))
        .await
        .unwrap()
        .is_empty());
    assert!(engine.keys("users:name:Bob").unwrap().is_empty());
    assert_eq!(engine.members("users:male:true").unwrap(), vec!["users:c"]);
    assert_eq!(engine.score("users:height", "users:a").unwrap(), None);
    assert_eq!(engine.score("users:age", "users:a").unwrap(), Some(20.0));
}

/// An update carrying an outdated etag is rejected.
#[tokio::test]
async fn test_update_stale_etag_conflicts() {
    let (store, _) = seeded().await;

    let first = bob().with_field("age", 20);
    let first = Item { etag: "etag-a2".into(), ..first };
    store.update(&ctx(), &first, &bob()).await.unwrap();

    let second = Item { etag: "etag-a3".into(), ..bob().with_field("age", 21) };
    let err = store.update(&ctx(), &second, &bob()).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);

    let stored = store
        .find(&ctx(), &Query::new().filter_eq("id", "a"))
        .await
        .unwrap();
    assert_eq!(stored.items, vec![first]);
}

/// Updating an item that does not exist fails.
#[tokio::test]
async fn test_update_missing_not_found() {
    let (store, engine) = setup();
    let err = store.update(&ctx(), &bob(), &bob()).await.unwrap_err();
    assert_eq!(err, StoreError::NotFound);
    assert!(engine.keys("*").unwrap().is_empty());
}

/// An update may not change the id.
#[tokio::test]
async fn test_update_id_mismatch() {
    let (store, _) = seeded().await;
    let err = store.update(&ctx(), &linda(), &bob()).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));
}

// =============================================================================
// Delete
// =============================================================================

/// Delete removes the record and every index entry.
#[tokio::test]
async fn test_delete_removes_everything() {
    let (store, engine) = setup();
    store.insert(&ctx(), &[bob()]).await.unwrap();
    store.delete(&ctx(), &bob()).await.unwrap();

    assert!(engine.keys("*").unwrap().is_empty());
    assert!(all(&store).await.is_empty());
}

/// Deleting one item leaves the others intact.
#[tokio::test]
async fn test_delete_leaves_others() {
    let (store, engine) = seeded().await;
    store.delete(&ctx(), &linda()).await.unwrap();

    assert_eq!(all(&store).await, vec![bob(), jimmy()]);
    assert_eq!(
        engine.members(&keys::all_ids_key("users")).unwrap(),
        vec!["users:a", "users:c"]
    );
    assert_eq!(engine.hget("users:b", "__id__").unwrap(), None);
    assert!(engine.keys("users:b:*").unwrap().is_empty());
}

/// Deleting with an outdated etag is rejected.
#[tokio::test]
async fn test_delete_stale_etag_conflicts() {
    let (store, _) = seeded().await;
    let stale = Item { etag: "etag-a0".into(), ..bob() };

    let err = store.delete(&ctx(), &stale).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);
    assert_eq!(all(&store).await.len(), 3);
}

/// Deleting an item that does not exist fails.
#[tokio::test]
async fn test_delete_missing_not_found() {
    let (store, _) = seeded().await;
    store.delete(&ctx(), &bob()).await.unwrap();

    let err = store.delete(&ctx(), &bob()).await.unwrap_err();
    assert_eq!(err, StoreError::NotFound);
}
