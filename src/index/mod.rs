//! Index maintenance
//!
//! Secondary indices live in the remote engine next to the records they
//! index and are updated inside the same script as the record write.
//!
//! # Structures
//!
//! - Discrete fields: one set per distinct value (`E:F:<token>`)
//! - Numeric fields: one sorted set per field, scored by value (`E:F`)
//! - Every record: `E:id:<id>` and `E:updated`
//!
//! # Invariants
//!
//! - A record is in an index iff its auxiliary lists name that index
//! - Index updates never run outside the guarded write that caused them

mod maintainer;

pub use maintainer::{IndexMaintainer, IndexMode};
