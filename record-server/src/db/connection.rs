use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::time::Duration;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Name of the SQL function that lowercases text with full Unicode folding.
/// The built-in `lower()` only folds ASCII.
pub const CASEFOLD_FN: &str = "casefold";

fn init_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.create_scalar_function(
        CASEFOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

pub fn create_pool(db_path: &str, max_size: u32, busy_timeout_ms: u64) -> anyhow::Result<DbPool> {
    let busy_timeout = Duration::from_millis(busy_timeout_ms);
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        init_connection(conn)
    });
    let pool = Pool::builder().max_size(max_size).build(manager)?;

    // Journal mode is persistent, one connection is enough
    let conn = pool.get()?;
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    tracing::debug!("[DB] Journal mode: {}", mode);

    Ok(pool)
}

/// Single-connection in-memory pool. Every checkout sees the same database.
pub fn create_memory_pool() -> anyhow::Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| init_connection(conn));
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)?;
    Ok(pool)
}

pub fn close_pool(pool: &DbPool) {
    if let Ok(conn) = pool.get() {
        let _ = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casefold_handles_non_ascii() -> anyhow::Result<()> {
        let pool = create_memory_pool()?;
        let conn = pool.get()?;

        let folded: String =
            conn.query_row("SELECT casefold('ÄRCHIV-Ölbild')", [], |row| row.get(0))?;
        assert_eq!(folded, "ärchiv-ölbild");

        let ascii_only: String = conn.query_row("SELECT lower('ÄRCHIV')", [], |row| row.get(0))?;
        assert_ne!(ascii_only, "ärchiv");

        let null: Option<String> = conn.query_row("SELECT casefold(NULL)", [], |row| row.get(0))?;
        assert_eq!(null, None);
        Ok(())
    }
}
