use crate::models::{format_ts, sql_limit, sql_offset};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Archive-service job attached to a record. The job subsystem owns these;
/// records only read them back through `record_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OasJob {
    pub id: String,
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub record_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOasJob {
    pub job_id: String,
    #[serde(default = "default_job_type")]
    pub job_type: String,
    pub record_id: Option<String>,
}

/// Job types the archive service knows about.
pub const JOB_TYPES: [&str; 3] = ["archive-retrieval", "inventory-retrieval", "pull-from-vault"];

fn default_job_type() -> String {
    JOB_TYPES[0].into()
}

pub fn is_known_job_type(job_type: &str) -> bool {
    JOB_TYPES.contains(&job_type)
}

fn row_to_job(row: &Row) -> rusqlite::Result<OasJob> {
    Ok(OasJob {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        job_type: row.get("job_type")?,
        status: row.get("status")?,
        record_id: row.get("record_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(conn: &Connection, data: &CreateOasJob) -> rusqlite::Result<OasJob> {
    let id = Uuid::new_v4().to_string();
    let now = format_ts(&chrono::Utc::now());
    conn.execute(
        "INSERT INTO oas_jobs (id, job_id, job_type, record_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, data.job_id, data.job_type, data.record_id, now, now],
    )?;
    conn.query_row("SELECT * FROM oas_jobs WHERE id = ?", params![id], |row| {
        row_to_job(row)
    })
}

pub fn find_all(conn: &Connection, limit: usize, offset: usize) -> rusqlite::Result<Vec<OasJob>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM oas_jobs ORDER BY created_at DESC, id ASC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(params![sql_limit(limit), sql_offset(offset)], |row| {
        row_to_job(row)
    })?;
    rows.collect()
}

pub fn find_by_job_id(
    conn: &Connection,
    job_id: &str,
    limit: usize,
    offset: usize,
) -> rusqlite::Result<Vec<OasJob>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM oas_jobs WHERE job_id = ?1
         ORDER BY created_at DESC, id ASC LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![job_id, sql_limit(limit), sql_offset(offset)], |row| {
        row_to_job(row)
    })?;
    rows.collect()
}

/// Loads the jobs of many records in one statement, grouped by record id.
pub fn find_by_record_ids(
    conn: &Connection,
    record_ids: &[String],
) -> rusqlite::Result<HashMap<String, Vec<OasJob>>> {
    let mut grouped: HashMap<String, Vec<OasJob>> = HashMap::new();
    if record_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders = vec!["?"; record_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM oas_jobs WHERE record_id IN ({}) ORDER BY created_at ASC, id ASC",
        placeholders
    );
    let params: Vec<&dyn ToSql> = record_ids.iter().map(|id| id as &dyn ToSql).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| row_to_job(row))?;
    for job in rows {
        let job = job?;
        if let Some(record_id) = job.record_id.clone() {
            grouped.entry(record_id).or_default().push(job);
        }
    }
    Ok(grouped)
}
