//! Script assembly
//!
//! Joins compiled fragments with their terminal stage and registers every
//! temporary key for cleanup.

use super::step::{Guard, Output, Script, SortStage, Step};
use crate::planner::Fragment;

impl Script {
    /// Find: evaluate the predicate, then sort and page its result
    pub fn find(fragment: Fragment, sort: SortStage) -> Self {
        Self {
            guards: Vec::new(),
            steps: fragment.steps,
            output: Output::Page(sort),
            cleanup: dedup(fragment.temp_keys),
        }
    }

    /// Clear: evaluate the predicate, then delete every match
    pub fn clear(fragment: Fragment, all_ids: String) -> Self {
        Self {
            guards: Vec::new(),
            steps: fragment.steps,
            output: Output::Purge {
                source: fragment.result,
                all_ids,
            },
            cleanup: dedup(fragment.temp_keys),
        }
    }

    /// A write that only runs if every guard holds
    pub fn guarded_write(guards: Vec<Guard>, steps: Vec<Step>) -> Self {
        Self {
            guards,
            steps,
            output: Output::Status,
            cleanup: Vec::new(),
        }
    }

    /// Number of temporary keys the script deletes on exit
    pub fn temp_key_count(&self) -> usize {
        self.cleanup.len()
    }
}

fn dedup(mut keys: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
    keys
}
