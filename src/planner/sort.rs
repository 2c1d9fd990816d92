//! Sort and pagination compiler
//!
//! Builds the server-side sort stage that orders a result key, cuts the
//! requested window and fetches the fields needed to decode each item.

use super::ast::{SortDirection, SortSpec, Window};
use crate::error::{StoreError, StoreResult};
use crate::item::{ItemCodec, FIELD_LIST};
use crate::schema::EntityIndexSpec;
use crate::script::SortStage;

/// Compiles sort specifications of one entity
#[derive(Debug, Clone, Copy)]
pub struct SortCompiler<'a> {
    spec: &'a EntityIndexSpec,
}

impl<'a> SortCompiler<'a> {
    /// Creates a sort compiler for the given entity
    pub fn new(spec: &'a EntityIndexSpec) -> Self {
        Self { spec }
    }

    /// Compiles the sort stage over `result_key`.
    ///
    /// At most one sort field is supported. Without one, sorted-set results
    /// keep score order and set results come back ordered by record key.
    pub fn compile(
        &self,
        result_key: &str,
        sort: &[SortSpec],
        window: Window,
    ) -> StoreResult<SortStage> {
        let (by, alpha, descending) = match sort {
            [] => (None, false, false),
            [spec] => {
                if !self.spec.is_sortable(&spec.field) {
                    return Err(StoreError::UnsortableField(spec.field.clone()));
                }
                (
                    Some(ItemCodec::sort_hash_field(&spec.field).to_string()),
                    !self.spec.is_numeric(&spec.field),
                    spec.direction == SortDirection::Desc,
                )
            }
            many => {
                return Err(StoreError::not_implemented(format!(
                    "sorting by {} fields, at most one is supported",
                    many.len()
                )))
            }
        };

        Ok(SortStage {
            source: result_key.to_string(),
            by,
            alpha,
            descending,
            get: FIELD_LIST.iter().map(|f| f.to_string()).collect(),
            offset: window.offset,
            limit: window.limit,
        })
    }
}
