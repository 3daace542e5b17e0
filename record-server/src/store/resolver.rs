//! Name-to-entity lookups for hosts, paths, app sets and backup sets.

use crate::models::entity::{self, Entity, EntityKind};
use crate::store::error::StoreResult;
use rusqlite::Connection;

/// Maps a natural name to the entities carrying it. The store only ever asks
/// for the first match and treats an empty answer as "unresolved".
pub trait EntityResolver: Send + Sync {
    fn resolve(
        &self,
        conn: &Connection,
        kind: EntityKind,
        name: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Entity>>;

    fn resolve_one(
        &self,
        conn: &Connection,
        kind: EntityKind,
        name: &str,
    ) -> StoreResult<Option<Entity>> {
        Ok(self.resolve(conn, kind, name, 1, 0)?.into_iter().next())
    }
}

/// Resolves against the entity tables in the same database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteResolver;

impl EntityResolver for SqliteResolver {
    fn resolve(
        &self,
        conn: &Connection,
        kind: EntityKind,
        name: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Entity>> {
        Ok(entity::find_by_name(conn, kind, name, limit, offset)?)
    }
}
