use crate::db::connection::DbPool;

/// Unique index over (host, app set, path, filename) on `records`.
pub const NATURAL_KEY_INDEX: &str = "idx_records_natural_key";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS hosts (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS paths (
  id TEXT PRIMARY KEY,
  path TEXT NOT NULL,
  host_id TEXT REFERENCES hosts(id) ON DELETE SET NULL,
  created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS app_sets (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  description TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS backup_sets (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  description TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS records (
  id TEXT PRIMARY KEY,
  host_id TEXT REFERENCES hosts(id),
  backup_set_id TEXT REFERENCES backup_sets(id),
  app_set_id TEXT REFERENCES app_sets(id),
  path_id TEXT NOT NULL REFERENCES paths(id),
  filename TEXT NOT NULL CHECK(filename <> ''),
  record_type INTEGER NOT NULL CHECK(record_type IN (1, 2)),
  archive_id TEXT NOT NULL DEFAULT '',
  backup_time TEXT NOT NULL,
  archived_time TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_records_natural_key
  ON records(IFNULL(host_id, ''), IFNULL(app_set_id, ''), path_id, filename);
CREATE INDEX IF NOT EXISTS idx_records_backup_time ON records(backup_time);
CREATE INDEX IF NOT EXISTS idx_records_archived_time ON records(archived_time);

CREATE TABLE IF NOT EXISTS oas_jobs (
  id TEXT PRIMARY KEY,
  job_id TEXT NOT NULL,
  job_type TEXT NOT NULL DEFAULT 'archive-retrieval' CHECK(job_type IN ('archive-retrieval','inventory-retrieval','pull-from-vault')),
  status TEXT NOT NULL DEFAULT 'in-progress' CHECK(status IN ('in-progress','succeeded','failed')),
  record_id TEXT REFERENCES records(id) ON DELETE SET NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_oas_jobs_job_id ON oas_jobs(job_id);
CREATE INDEX IF NOT EXISTS idx_oas_jobs_record_id ON oas_jobs(record_id);
"#;

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_memory_pool;

    #[test]
    fn test_migrate_is_idempotent() -> anyhow::Result<()> {
        let pool = create_memory_pool()?;
        migrate(&pool)?;
        migrate(&pool)?;

        let conn = pool.get()?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('hosts', 'paths', 'app_sets', 'backup_sets', 'records', 'oas_jobs')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 6);

        let index: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            [NATURAL_KEY_INDEX],
            |row| row.get(0),
        )?;
        assert_eq!(index, 1);
        Ok(())
    }
}
