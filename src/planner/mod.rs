//! Query planning
//!
//! Compiles predicates and sort specifications into script steps. Nothing
//! here talks to the remote engine.
//!
//! # Design Principles
//!
//! - Indexed: predicates only reference declared filterable fields
//! - Explicit: unsupported operator/field combinations fail at compile time
//! - Isolated: intermediate results live in per-invocation temporary keys
//!
//! # Limits
//!
//! - Range operators apply to numeric fields only
//! - At most one sort field

mod ast;
mod compiler;
mod keygen;
mod sort;

pub use ast::{Predicate, Query, SortDirection, SortSpec, Window};
pub use compiler::{Fragment, PredicateCompiler};
pub use keygen::TempKeys;
pub use sort::SortCompiler;
