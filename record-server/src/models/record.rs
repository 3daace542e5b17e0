use crate::models::entity::{AppSet, BackupSet, Host, StoragePath};
use crate::models::oas_job::OasJob;
use crate::models::{format_ts, ts_column};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Query wildcard. Never stored.
    #[default]
    All,
    Backup,
    Archive,
}

impl RecordType {
    pub fn code(self) -> i64 {
        match self {
            RecordType::All => 0,
            RecordType::Backup => 1,
            RecordType::Archive => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RecordType::All),
            1 => Some(RecordType::Backup),
            2 => Some(RecordType::Archive),
            _ => None,
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "all" | "0" => Ok(RecordType::All),
            "backup" | "1" => Ok(RecordType::Backup),
            "archive" | "2" => Ok(RecordType::Archive),
            other => Err(format!("unknown record type '{}'", other)),
        }
    }
}

impl ToSql for RecordType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for RecordType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        RecordType::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// A record as read back from the store, with whatever relations the
/// configured depth loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub host_id: Option<String>,
    pub backup_set_id: Option<String>,
    pub app_set_id: Option<String>,
    pub path_id: String,
    pub host: Option<Host>,
    pub backup_set: Option<BackupSet>,
    pub app_set: Option<AppSet>,
    pub path: Option<StoragePath>,
    pub filename: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub archive_id: String,
    pub backup_time: DateTime<Utc>,
    pub archived_time: Option<DateTime<Utc>>,
    pub jobs: Vec<OasJob>,
}

impl Record {
    /// `<app set>/<host><path>/<filename>`. Needs the path relation loaded.
    pub fn full_path(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        let app_set = self.app_set.as_ref().map(|a| a.name.as_str()).unwrap_or("");
        let host = self.host.as_ref().map(|h| h.name.as_str()).unwrap_or("");
        Some(
            format!("{}/{}{}/{}", app_set, host, path.path, self.filename)
                .trim()
                .to_string(),
        )
    }
}

/// Column values written by insert and update.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub id: String,
    pub host_id: Option<String>,
    pub backup_set_id: Option<String>,
    pub app_set_id: Option<String>,
    pub path_id: String,
    pub filename: String,
    pub record_type: RecordType,
    pub archive_id: String,
    pub backup_time: DateTime<Utc>,
    pub archived_time: Option<DateTime<Utc>>,
}

const BARE_SELECT: &str = "SELECT r.* FROM records r";

const EXPANDED_SELECT: &str = "SELECT r.*,
    h.name AS host_name,
    p.path AS path_path, p.host_id AS path_host_id,
    a.name AS app_set_name, a.description AS app_set_description,
    b.name AS backup_set_name, b.description AS backup_set_description
  FROM records r
  LEFT JOIN hosts h ON h.id = r.host_id
  LEFT JOIN paths p ON p.id = r.path_id
  LEFT JOIN app_sets a ON a.id = r.app_set_id
  LEFT JOIN backup_sets b ON b.id = r.backup_set_id";

/// SELECT head aliased as `r`. Expanded selects join the related entities.
pub fn select_head(expand: bool) -> &'static str {
    if expand {
        EXPANDED_SELECT
    } else {
        BARE_SELECT
    }
}

fn row_to_record(row: &Row, expand: bool) -> rusqlite::Result<Record> {
    let host_id: Option<String> = row.get("host_id")?;
    let backup_set_id: Option<String> = row.get("backup_set_id")?;
    let app_set_id: Option<String> = row.get("app_set_id")?;
    let path_id: String = row.get("path_id")?;

    let (host, path, app_set, backup_set) = if expand {
        let host = match (&host_id, row.get::<_, Option<String>>("host_name")?) {
            (Some(id), Some(name)) => Some(Host { id: id.clone(), name }),
            _ => None,
        };
        let path = row
            .get::<_, Option<String>>("path_path")?
            .map(|p| -> rusqlite::Result<StoragePath> {
                Ok(StoragePath {
                    id: path_id.clone(),
                    path: p,
                    host_id: row.get("path_host_id")?,
                })
            })
            .transpose()?;
        let app_set = match (&app_set_id, row.get::<_, Option<String>>("app_set_name")?) {
            (Some(id), Some(name)) => Some(AppSet {
                id: id.clone(),
                name,
                description: row.get("app_set_description")?,
            }),
            _ => None,
        };
        let backup_set = match (&backup_set_id, row.get::<_, Option<String>>("backup_set_name")?) {
            (Some(id), Some(name)) => Some(BackupSet {
                id: id.clone(),
                name,
                description: row.get("backup_set_description")?,
            }),
            _ => None,
        };
        (host, path, app_set, backup_set)
    } else {
        (None, None, None, None)
    };

    let backup_time = ts_column(row, "backup_time")?.ok_or_else(|| {
        let idx = row.as_ref().column_index("backup_time").unwrap_or_default();
        rusqlite::Error::InvalidColumnType(idx, "backup_time".into(), rusqlite::types::Type::Null)
    })?;

    Ok(Record {
        id: row.get("id")?,
        host_id,
        backup_set_id,
        app_set_id,
        path_id,
        host,
        backup_set,
        app_set,
        path,
        filename: row.get("filename")?,
        record_type: row.get("record_type")?,
        archive_id: row.get("archive_id")?,
        backup_time,
        archived_time: ts_column(row, "archived_time")?,
        jobs: Vec::new(),
    })
}

/// Runs a select built on `select_head(expand)`.
pub fn query(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    expand: bool,
) -> rusqlite::Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row_to_record(row, expand))?;
    rows.collect()
}

pub fn insert(conn: &Connection, row: &RecordRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO records (id, host_id, backup_set_id, app_set_id, path_id, filename, record_type, archive_id, backup_time, archived_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.id,
            row.host_id,
            row.backup_set_id,
            row.app_set_id,
            row.path_id,
            row.filename,
            row.record_type,
            row.archive_id,
            format_ts(&row.backup_time),
            row.archived_time.as_ref().map(format_ts),
        ],
    )?;
    Ok(())
}

/// Full-row update keyed by id. Returns the number of rows changed.
pub fn update(conn: &Connection, row: &RecordRow) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE records SET host_id = ?2, backup_set_id = ?3, app_set_id = ?4, path_id = ?5,
           filename = ?6, record_type = ?7, archive_id = ?8, backup_time = ?9, archived_time = ?10
         WHERE id = ?1",
        params![
            row.id,
            row.host_id,
            row.backup_set_id,
            row.app_set_id,
            row.path_id,
            row.filename,
            row.record_type,
            row.archive_id,
            format_ts(&row.backup_time),
            row.archived_time.as_ref().map(format_ts),
        ],
    )
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM records WHERE id = ?", params![id])
}

pub fn exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}
