//! Operation orchestrator
//!
//! Compiles each store operation into one script, runs it against the
//! backend under the caller's cancellation and deadline, and maps the reply
//! back to a result.
//!
//! # Writes
//!
//! - Insert: guard that no record exists, write records, index, register ids
//! - Update: guard the stored etag, rewrite the record, re-index
//! - Delete: guard the stored etag, drop the record, un-index, unregister
//!
//! Guards run inside the script before any write, so a rejected write
//! changes nothing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::context::OpContext;
use super::result::ItemList;
use super::storer::Storer;
use crate::config::StoreConfig;
use crate::engine::{Backend, RedisBackend, Reply};
use crate::error::{StoreError, StoreResult};
use crate::index::{IndexMaintainer, IndexMode};
use crate::item::{Item, ItemCodec, ETAG_HASH_FIELD, FIELD_LIST};
use crate::keys;
use crate::planner::{Predicate, PredicateCompiler, Query, SortCompiler, Window};
use crate::schema::EntityIndexSpec;
use crate::script::{Command, Guard, Script, Step, STATUS_CONFLICT, STATUS_NOT_FOUND, STATUS_OK};

/// Store for the items of one entity
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    spec: Arc<EntityIndexSpec>,
    config: StoreConfig,
}

impl Store {
    /// Creates a store over an existing backend
    pub fn new(backend: Arc<dyn Backend>, spec: EntityIndexSpec, config: StoreConfig) -> Self {
        Self {
            backend,
            spec: Arc::new(spec),
            config,
        }
    }

    /// Connects to the Redis server named by `config`
    pub async fn connect(spec: EntityIndexSpec, config: StoreConfig) -> StoreResult<Self> {
        let backend = RedisBackend::connect(&config.redis_url).await?;
        Ok(Self::new(Arc::new(backend), spec, config))
    }

    /// Index specification of the entity
    pub fn spec(&self) -> &EntityIndexSpec {
        &self.spec
    }

    /// Configuration in effect
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Compiles an insert without running it
    pub fn compile_insert(&self, items: &[Item]) -> StoreResult<Script> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in items {
            if !seen.insert(item.id.as_str()) {
                warn!(
                    event = "INSERT_DUPLICATE_ID",
                    entity = self.spec.entity(),
                    id = %item.id,
                    "id appears twice in one insert"
                );
                return Err(StoreError::Conflict);
            }
        }

        let codec = ItemCodec::new(&self.spec);
        let maintainer = IndexMaintainer::new(&self.spec);
        let mut record_keys = Vec::with_capacity(items.len());
        let mut steps = Vec::new();

        for item in items {
            let record = codec.encode(item)?;
            record_keys.push(record.key.clone());
            steps.push(Step::Exec(Command::HSet {
                key: record.key,
                fields: record.fields,
            }));
            maintainer.apply(&mut steps, item, IndexMode::Add);
        }
        steps.push(Step::Exec(Command::SAdd {
            key: keys::all_ids_key(self.spec.entity()),
            members: record_keys.clone(),
        }));

        Ok(Script::guarded_write(
            vec![Guard::Absent { keys: record_keys }],
            steps,
        ))
    }

    /// Compiles an update without running it
    pub fn compile_update(&self, item: &Item, original: &Item) -> StoreResult<Script> {
        if item.id != original.id {
            return Err(StoreError::invalid_value(format!(
                "update changes id '{}' to '{}'",
                original.id, item.id
            )));
        }

        let codec = ItemCodec::new(&self.spec);
        let maintainer = IndexMaintainer::new(&self.spec);
        let record = codec.encode(item)?;

        let guard = Guard::Matches {
            key: record.key.clone(),
            field: ETAG_HASH_FIELD.to_string(),
            expected: original.etag.clone(),
        };
        let mut steps = vec![
            Step::Exec(Command::Del {
                keys: vec![record.key.clone()],
            }),
            Step::Exec(Command::HSet {
                key: record.key.clone(),
                fields: record.fields,
            }),
        ];
        maintainer.apply(&mut steps, original, IndexMode::Remove);
        maintainer.apply(&mut steps, item, IndexMode::Add);
        steps.push(Step::Exec(Command::SAdd {
            key: keys::all_ids_key(self.spec.entity()),
            members: vec![record.key],
        }));

        Ok(Script::guarded_write(vec![guard], steps))
    }

    /// Compiles a delete without running it
    pub fn compile_delete(&self, item: &Item) -> StoreResult<Script> {
        let codec = ItemCodec::new(&self.spec);
        let maintainer = IndexMaintainer::new(&self.spec);
        codec.check_id(&item.id)?;
        let key = codec.item_key(item);

        let guard = Guard::Matches {
            key: key.clone(),
            field: ETAG_HASH_FIELD.to_string(),
            expected: item.etag.clone(),
        };
        let mut steps = vec![Step::Exec(Command::Del {
            keys: vec![key.clone()],
        })];
        maintainer.apply(&mut steps, item, IndexMode::Remove);
        steps.push(Step::Exec(Command::SRem {
            key: keys::all_ids_key(self.spec.entity()),
            members: vec![key],
        }));

        Ok(Script::guarded_write(vec![guard], steps))
    }

    /// Compiles a clear without running it
    pub fn compile_clear(&self, predicates: &[Predicate]) -> StoreResult<Script> {
        let fragment =
            PredicateCompiler::new(&self.spec, &self.config.temp_key_prefix).compile(predicates)?;
        Ok(Script::clear(
            fragment,
            keys::all_ids_key(self.spec.entity()),
        ))
    }

    /// Compiles a find without running it
    pub fn compile_find(&self, query: &Query) -> StoreResult<Script> {
        let fragment = PredicateCompiler::new(&self.spec, &self.config.temp_key_prefix)
            .compile(&query.predicates)?;
        let sort =
            SortCompiler::new(&self.spec).compile(&fragment.result, &query.sort, query.window)?;
        Ok(Script::find(fragment, sort))
    }

    async fn run(&self, ctx: &OpContext, op: &'static str, script: &Script) -> StoreResult<Reply> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        debug!(
            event = "SCRIPT_DISPATCHED",
            op,
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            backend = self.backend.name(),
            guards = script.guards.len(),
            steps = script.steps.len(),
            temp_keys = script.temp_key_count(),
        );

        let call = self.backend.execute(script);
        let bounded = async {
            match ctx.effective_deadline(self.config.op_timeout) {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .map_err(|_| StoreError::Timeout)?,
                None => call.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(StoreError::Cancelled),
            result = bounded => result,
        };

        if let Err(e) = &result {
            if matches!(e, StoreError::Cancelled | StoreError::Timeout) {
                warn!(
                    event = "OPERATION_ABANDONED",
                    op,
                    entity = self.spec.entity(),
                    op_id = %ctx.op_id,
                    reason = e.code(),
                    "in-flight script may still complete"
                );
            }
        }
        result
    }

    fn rejected(&self, op: &'static str, ctx: &OpContext, id: &str, e: &StoreError) {
        warn!(
            event = "WRITE_REJECTED",
            op,
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            id,
            reason = e.code(),
        );
    }

    fn decode_page(&self, reply: Reply, window: Window) -> StoreResult<ItemList> {
        let kind = reply.kind();
        let Reply::Array(parts) = reply else {
            return Err(StoreError::malformed(format!(
                "find returned {}, expected [total, rows]",
                kind
            )));
        };
        let [total, rows]: [Reply; 2] = parts
            .try_into()
            .map_err(|_| StoreError::malformed("find reply must hold [total, rows]"))?;
        let Reply::Int(total) = total else {
            return Err(StoreError::malformed("match count is not an integer"));
        };
        let Reply::Array(rows) = rows else {
            return Err(StoreError::malformed("rows are not an array"));
        };
        if rows.len() % FIELD_LIST.len() != 0 {
            return Err(StoreError::malformed(format!(
                "{} values do not split into rows of {}",
                rows.len(),
                FIELD_LIST.len()
            )));
        }

        let codec = ItemCodec::new(&self.spec);
        let mut items = Vec::with_capacity(rows.len() / FIELD_LIST.len());
        let mut row = Vec::with_capacity(FIELD_LIST.len());
        for chunk in rows.chunks(FIELD_LIST.len()) {
            row.clear();
            for cell in chunk {
                row.push(match cell {
                    Reply::Bulk(s) => Some(s.clone()),
                    Reply::Nil => None,
                    other => {
                        return Err(StoreError::malformed(format!(
                            "item field is {}, expected string",
                            other.kind()
                        )))
                    }
                });
            }
            items.push(codec.decode(&row)?);
        }

        Ok(ItemList {
            total: usize::try_from(total)
                .map_err(|_| StoreError::malformed("negative match count"))?,
            offset: window.offset,
            limit: window.limit,
            items,
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("entity", &self.spec.entity())
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Maps a write script's status reply
fn write_status(reply: Reply) -> StoreResult<()> {
    match reply {
        Reply::Bulk(status) if status == STATUS_OK => Ok(()),
        Reply::Bulk(status) if status == STATUS_CONFLICT => Err(StoreError::Conflict),
        Reply::Bulk(status) if status == STATUS_NOT_FOUND => Err(StoreError::NotFound),
        Reply::Bulk(status) => Err(StoreError::malformed(format!(
            "unknown write status '{}'",
            status
        ))),
        other => Err(StoreError::malformed(format!(
            "write returned {}, expected a status",
            other.kind()
        ))),
    }
}

#[async_trait]
impl Storer for Store {
    async fn insert(&self, ctx: &OpContext, items: &[Item]) -> StoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let script = self.compile_insert(items)?;
        let reply = self.run(ctx, "insert", &script).await?;
        if let Err(e) = write_status(reply) {
            self.rejected("insert", ctx, &items[0].id, &e);
            return Err(e);
        }

        info!(
            event = "ITEMS_INSERTED",
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            count = items.len(),
        );
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, item: &Item, original: &Item) -> StoreResult<()> {
        let script = self.compile_update(item, original)?;
        let reply = self.run(ctx, "update", &script).await?;
        if let Err(e) = write_status(reply) {
            self.rejected("update", ctx, &item.id, &e);
            return Err(e);
        }

        info!(
            event = "ITEM_UPDATED",
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            id = %item.id,
        );
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, item: &Item) -> StoreResult<()> {
        let script = self.compile_delete(item)?;
        let reply = self.run(ctx, "delete", &script).await?;
        if let Err(e) = write_status(reply) {
            self.rejected("delete", ctx, &item.id, &e);
            return Err(e);
        }

        info!(
            event = "ITEM_DELETED",
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            id = %item.id,
        );
        Ok(())
    }

    async fn clear(&self, ctx: &OpContext, predicates: &[Predicate]) -> StoreResult<usize> {
        let script = self.compile_clear(predicates)?;
        let count = match self.run(ctx, "clear", &script).await? {
            Reply::Int(n) => {
                usize::try_from(n).map_err(|_| StoreError::malformed("negative clear count"))?
            }
            other => {
                return Err(StoreError::malformed(format!(
                    "clear returned {}, expected an integer",
                    other.kind()
                )))
            }
        };

        info!(
            event = "ITEMS_CLEARED",
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            count,
        );
        Ok(count)
    }

    async fn find(&self, ctx: &OpContext, query: &Query) -> StoreResult<ItemList> {
        let script = self.compile_find(query)?;
        let reply = self.run(ctx, "find", &script).await?;
        let list = self.decode_page(reply, query.window)?;

        debug!(
            event = "FIND_COMPLETED",
            entity = self.spec.entity(),
            op_id = %ctx.op_id,
            total = list.total,
            returned = list.len(),
        );
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::schema::FieldDef;
    use crate::script::Output;

    fn store() -> Store {
        let spec = EntityIndexSpec::new("users")
            .with_field("name", FieldDef::string().filterable())
            .with_field("age", FieldDef::integer().filterable().sortable());
        Store::new(Arc::new(MemoryEngine::new()), spec, StoreConfig::default())
    }

    #[test]
    fn test_insert_guards_every_record() {
        let store = store();
        let script = store
            .compile_insert(&[Item::new("a", "e"), Item::new("b", "e")])
            .unwrap();
        assert_eq!(
            script.guards,
            vec![Guard::Absent {
                keys: vec!["users:a".to_string(), "users:b".to_string()],
            }]
        );
        assert_eq!(
            script.steps.last(),
            Some(&Step::Exec(Command::SAdd {
                key: "users:ids".to_string(),
                members: vec!["users:a".to_string(), "users:b".to_string()],
            }))
        );
    }

    #[test]
    fn test_duplicate_ids_conflict_before_dispatch() {
        let store = store();
        let err = store
            .compile_insert(&[Item::new("a", "e1"), Item::new("a", "e2")])
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict);
    }

    #[test]
    fn test_update_rejects_id_change() {
        let store = store();
        let err = store
            .compile_update(&Item::new("b", "e2"), &Item::new("a", "e1"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue(_)));
    }

    #[test]
    fn test_update_guards_original_etag() {
        let store = store();
        let script = store
            .compile_update(&Item::new("a", "e2"), &Item::new("a", "e1"))
            .unwrap();
        assert_eq!(
            script.guards,
            vec![Guard::Matches {
                key: "users:a".to_string(),
                field: "__etag__".to_string(),
                expected: "e1".to_string(),
            }]
        );
        assert_eq!(
            script.steps[0],
            Step::Exec(Command::Del {
                keys: vec!["users:a".to_string()]
            })
        );
    }

    #[test]
    fn test_find_compiles_sort_over_result() {
        let store = store();
        let query = Query::new().filter_eq("age", 19).with_limit(5);
        let script = store.compile_find(&query).unwrap();
        match &script.output {
            Output::Page(stage) => {
                assert_eq!(script.cleanup.last(), Some(&stage.source));
                assert_eq!(stage.limit, Some(5));
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert!(script.cleanup.iter().all(|k| k.starts_with("tmp:users:")));
    }

    #[test]
    fn test_write_status_mapping() {
        assert!(write_status(Reply::Bulk("OK".into())).is_ok());
        assert_eq!(
            write_status(Reply::Bulk("CONFLICT".into())),
            Err(StoreError::Conflict)
        );
        assert_eq!(
            write_status(Reply::Bulk("NOT_FOUND".into())),
            Err(StoreError::NotFound)
        );
        assert!(matches!(
            write_status(Reply::Int(1)),
            Err(StoreError::MalformedResult(_))
        ));
    }

    #[test]
    fn test_decode_page_rejects_ragged_rows() {
        let store = store();
        let reply = Reply::Array(vec![
            Reply::Int(1),
            Reply::Array(vec![Reply::Bulk("a".into())]),
        ]);
        assert!(matches!(
            store.decode_page(reply, Window::all()),
            Err(StoreError::MalformedResult(_))
        ));
    }
}
