//! Entity index specifications
//!
//! Supplied by the caller, immutable per entity. Decides which payload
//! fields get secondary indices and which structure serves each one.

mod types;

pub use types::{EntityIndexSpec, FieldClass, FieldDef, FieldType, ID_FIELD, UPDATED_FIELD};
