//! Store subsystem
//!
//! The public face of the crate: a [`Store`] per entity implementing
//! [`Storer`], and the [`OpContext`] every operation runs under.
//!
//! # Invariants
//!
//! - One script per operation; writes are guarded and atomic
//! - Validation and compilation errors surface before any remote call
//! - Temporary keys never outlive the script that created them

mod context;
mod handler;
mod result;
mod storer;

pub use context::OpContext;
pub use handler::Store;
pub use result::ItemList;
pub use storer::Storer;
