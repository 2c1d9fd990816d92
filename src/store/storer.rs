//! The store interface

use async_trait::async_trait;

use super::context::OpContext;
use super::result::ItemList;
use crate::error::StoreResult;
use crate::item::Item;
use crate::planner::{Predicate, Query};

/// Operations over the items of one entity.
///
/// # Abandonment
///
/// Every method races the remote call against `ctx`'s cancellation and
/// deadline. When the race is lost the method returns `Cancelled` or
/// `Timeout` and drops the in-flight call, but the script may already have
/// reached the server and run to completion. Callers that need to know must
/// re-read.
#[async_trait]
pub trait Storer: Send + Sync {
    /// Stores new items.
    ///
    /// Fails with `Conflict` and writes nothing when any id already exists
    /// or appears twice in `items`. An empty slice is a no-op.
    async fn insert(&self, ctx: &OpContext, items: &[Item]) -> StoreResult<()>;

    /// Replaces `original` with `item`.
    ///
    /// The stored etag must still equal `original.etag`: `NotFound` if the
    /// item is gone, `Conflict` if it changed. `item.id` must equal
    /// `original.id`.
    async fn update(&self, ctx: &OpContext, item: &Item, original: &Item) -> StoreResult<()>;

    /// Deletes `item` if its stored etag still equals `item.etag`.
    async fn delete(&self, ctx: &OpContext, item: &Item) -> StoreResult<()>;

    /// Deletes every item matching the predicates, returning how many were
    /// deleted. No predicates deletes everything.
    async fn clear(&self, ctx: &OpContext, predicates: &[Predicate]) -> StoreResult<usize>;

    /// Returns the matching items, sorted and windowed.
    async fn find(&self, ctx: &OpContext, query: &Query) -> StoreResult<ItemList>;
}
