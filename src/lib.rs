//! docdex - a secondary-indexed document store over Redis
//!
//! Items of an entity are stored as Redis hashes. Declared fields are indexed
//! in sets (discrete values) and sorted sets (numeric values), and every
//! operation compiles to a single server-side script that reads or updates
//! records and indices together.
//!
//! ```text
//! Query ─► PredicateCompiler ─┐
//!          SortCompiler ──────┼─► Script ─► Backend (Redis / in-memory)
//! Item ──► ItemCodec ─────────┤
//!          IndexMaintainer ───┘
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod item;
pub mod keys;
pub mod planner;
pub mod schema;
pub mod script;
pub mod store;

pub use config::StoreConfig;
pub use engine::{Backend, MemoryEngine, RedisBackend, Reply};
pub use error::{StoreError, StoreResult};
pub use item::{Item, Value};
pub use planner::{Predicate, Query, SortDirection, SortSpec, Window};
pub use schema::{EntityIndexSpec, FieldDef, FieldType};
pub use store::{ItemList, OpContext, Store, Storer};
