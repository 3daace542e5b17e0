//! Record persistence: identity by natural key, transactional writes and
//! filtered reads with bounded relation expansion.

pub mod draft;
pub mod error;
pub mod query;
pub mod resolver;

pub use draft::{is_well_formed_id, EntityRef, RecordDraft};
pub use error::{FieldErrors, StoreError, StoreResult};
pub use query::{QueryOptions, RecordFilter, SortOrder, TimeRanges};
pub use resolver::{EntityResolver, SqliteResolver};

use crate::db::connection::DbPool;
use crate::models::oas_job;
use crate::models::record::{self, Record};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// How much of a record's graph a query loads.
///
/// - `0`: the record row only; related entities are present as ids.
/// - `1`: host, path, app set and backup set, joined in the same statement.
/// - `2` and up: also the record's jobs, in one batched statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDepth(pub u8);

impl RelationDepth {
    pub fn entities(self) -> bool {
        self.0 >= 1
    }

    pub fn jobs(self) -> bool {
        self.0 >= 2
    }
}

impl Default for RelationDepth {
    fn default() -> Self {
        RelationDepth(2)
    }
}

pub struct RecordStore<R: EntityResolver = SqliteResolver> {
    pool: DbPool,
    resolver: R,
    depth: RelationDepth,
}

impl RecordStore<SqliteResolver> {
    pub fn new(pool: DbPool, depth: RelationDepth) -> Self {
        Self::with_resolver(pool, SqliteResolver, depth)
    }
}

impl<R: EntityResolver> RecordStore<R> {
    pub fn with_resolver(pool: DbPool, resolver: R, depth: RelationDepth) -> Self {
        Self { pool, resolver, depth }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Creates the record or, when one with the same natural key exists,
    /// overwrites it and keeps its id. Returns the id either way.
    ///
    /// The write lock is taken before the natural-key lookup, so two
    /// concurrent upserts of a new key can not both insert.
    pub fn upsert(&self, draft: &RecordDraft) -> StoreResult<String> {
        let mut conn = self.pool.get()?;
        in_transaction(&mut conn, "upsert", |tx| {
            let mut errors = FieldErrors::default();
            let refs = draft::resolve_refs(&self.resolver, tx, draft, &mut errors)?;

            let existing = match &refs.path_id {
                Some(path_id) if !draft.filename.trim().is_empty() => {
                    let plan = query::natural_key(
                        refs.host_id.as_deref(),
                        refs.app_set_id.as_deref(),
                        path_id,
                        &draft.filename,
                    );
                    let (sql, params) = plan.to_sql(false);
                    record::query(tx, &sql, &param_refs(&params), false)?
                        .into_iter()
                        .next()
                        .map(|r| r.id)
                }
                _ => None,
            };

            let id = existing
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let row = draft::validate(draft, id, refs, errors)?;

            if existing.is_some() {
                record::update(tx, &row).map_err(error::natural_key_conflict)?;
                tracing::debug!(record_id = %row.id, "[STORE] Record updated by natural key");
            } else {
                record::insert(tx, &row).map_err(error::natural_key_conflict)?;
                tracing::debug!(record_id = %row.id, "[STORE] Record created");
            }
            Ok(row.id)
        })
    }

    /// Overwrites the record with the draft's id. `Ok(false)` when no such
    /// record exists.
    pub fn update(&self, draft: &RecordDraft) -> StoreResult<bool> {
        let mut conn = self.pool.get()?;
        in_transaction(&mut conn, "update", |tx| {
            let mut errors = FieldErrors::default();
            let refs = draft::resolve_refs(&self.resolver, tx, draft, &mut errors)?;
            let id = draft.id.clone().unwrap_or_default();
            let row = draft::validate(draft, id, refs, errors)?;

            let changes = record::update(tx, &row).map_err(error::natural_key_conflict)?;
            tracing::debug!(record_id = %row.id, changes, "[STORE] Record update applied");
            Ok(changes > 0)
        })
    }

    /// Deletes by id. `Ok(false)` when the id is well formed but unknown.
    pub fn delete(&self, id: &str) -> StoreResult<bool> {
        if !is_well_formed_id(id) {
            let mut errors = FieldErrors::default();
            errors.push("id", "must be a hyphenated UUID");
            return Err(errors.into());
        }

        let mut conn = self.pool.get()?;
        in_transaction(&mut conn, "delete", |tx| {
            let changes = record::delete(tx, id)?;
            tracing::debug!(record_id = %id, changes, "[STORE] Record delete applied");
            Ok(changes > 0)
        })
    }

    /// Records matching every populated field of `filter`, ordered by the
    /// filter's record type and paged by `options`. Read-only, outside any
    /// explicit transaction.
    pub fn query(&self, filter: &RecordFilter, options: &QueryOptions) -> StoreResult<Vec<Record>> {
        let conn = self.pool.get()?;
        let resolved = query::resolve_filter(&self.resolver, &conn, filter);
        let plan = query::compose(&resolved, options);
        self.fetch(&conn, &plan)
    }

    pub fn find_by_id(&self, id: &str) -> StoreResult<Option<Record>> {
        let filter = RecordFilter {
            id: Some(id.to_string()),
            ..Default::default()
        };
        let options = QueryOptions {
            limit: 1,
            ..Default::default()
        };
        Ok(self.query(&filter, &options)?.into_iter().next())
    }

    fn fetch(&self, conn: &Connection, plan: &query::SelectPlan) -> StoreResult<Vec<Record>> {
        let expand = self.depth.entities();
        let (sql, params) = plan.to_sql(expand);
        let mut records = record::query(conn, &sql, &param_refs(&params), expand)?;

        if self.depth.jobs() && !records.is_empty() {
            let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
            let mut jobs = oas_job::find_by_record_ids(conn, &ids)?;
            for r in records.iter_mut() {
                r.jobs = jobs.remove(&r.id).unwrap_or_default();
            }
        }
        Ok(records)
    }
}

fn param_refs(params: &[Box<dyn ToSql>]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

/// Runs `f` inside an immediate transaction. Commits on success, rolls back
/// on any error before handing it back.
fn in_transaction<T, F>(conn: &mut Connection, op: &str, f: F) -> StoreResult<T>
where
    F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback() {
                tracing::warn!("[STORE] Rollback of {} failed: {}", op, rb);
            }
            if e.is_validation() || matches!(e, StoreError::Conflict(_)) {
                tracing::debug!("[STORE] {} rejected: {}", op, e);
            } else {
                tracing::warn!("[STORE] {} failed: {}", op, e);
            }
            Err(e)
        }
    }
}
