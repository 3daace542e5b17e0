use crate::models::{sql_limit, sql_offset};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The entities a record points at. Each is owned elsewhere and only
/// referenced by id from `records`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Host,
    Path,
    AppSet,
    BackupSet,
}

impl EntityKind {
    fn table(self) -> &'static str {
        match self {
            EntityKind::Host => "hosts",
            EntityKind::Path => "paths",
            EntityKind::AppSet => "app_sets",
            EntityKind::BackupSet => "backup_sets",
        }
    }

    /// Column holding the natural name. Paths are named by their path string.
    fn name_column(self) -> &'static str {
        match self {
            EntityKind::Path => "path",
            _ => "name",
        }
    }

    /// Field name used in records and validation messages.
    pub fn field(self) -> &'static str {
        match self {
            EntityKind::Host => "host",
            EntityKind::Path => "path",
            EntityKind::AppSet => "app_set",
            EntityKind::BackupSet => "backup_set",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Minimal view of any entity, as returned by name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePath {
    pub id: String,
    pub path: String,
    pub host_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSet {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    pub id: String,
    pub name: String,
    pub description: String,
}

pub fn find_by_name(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
    limit: usize,
    offset: usize,
) -> rusqlite::Result<Vec<Entity>> {
    let sql = format!(
        "SELECT id, {col} AS name FROM {table} WHERE {col} = ?1
         ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3",
        col = kind.name_column(),
        table = kind.table(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![name, sql_limit(limit), sql_offset(offset)],
        |row| {
            Ok(Entity {
                kind,
                id: row.get("id")?,
                name: row.get("name")?,
            })
        },
    )?;
    rows.collect()
}

pub fn exists(conn: &Connection, kind: EntityKind, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", kind.table());
    conn.query_row(&sql, params![id], |row| row.get(0))
}

pub fn create_host(conn: &Connection, name: &str) -> rusqlite::Result<Host> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO hosts (id, name) VALUES (?1, ?2)",
        params![id, name],
    )?;
    Ok(Host {
        id,
        name: name.to_string(),
    })
}

pub fn create_path(
    conn: &Connection,
    path: &str,
    host_id: Option<&str>,
) -> rusqlite::Result<StoragePath> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO paths (id, path, host_id) VALUES (?1, ?2, ?3)",
        params![id, path, host_id],
    )?;
    Ok(StoragePath {
        id,
        path: path.to_string(),
        host_id: host_id.map(str::to_string),
    })
}

pub fn create_app_set(
    conn: &Connection,
    name: &str,
    description: &str,
) -> rusqlite::Result<AppSet> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO app_sets (id, name, description) VALUES (?1, ?2, ?3)",
        params![id, name, description],
    )?;
    Ok(AppSet {
        id,
        name: name.to_string(),
        description: description.to_string(),
    })
}

pub fn create_backup_set(
    conn: &Connection,
    name: &str,
    description: &str,
) -> rusqlite::Result<BackupSet> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO backup_sets (id, name, description) VALUES (?1, ?2, ?3)",
        params![id, name, description],
    )?;
    Ok(BackupSet {
        id,
        name: name.to_string(),
        description: description.to_string(),
    })
}
