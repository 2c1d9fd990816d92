//! Server-side scripts
//!
//! A [`Script`] is the unit of atomic work sent to the remote engine. Writes
//! are guarded scripts that either apply completely or report why they did
//! not; reads evaluate a compiled predicate and sort its result in the same
//! invocation.

mod assembler;
pub mod lua;
mod step;

pub use step::{
    Command, Guard, Output, Script, ScoreBound, SortStage, Step, STATUS_CONFLICT,
    STATUS_NOT_FOUND, STATUS_OK,
};
