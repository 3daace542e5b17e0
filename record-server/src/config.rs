use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub db_pool_size: u32,
    pub db_busy_timeout_ms: u64,
    pub rel_depth: u8,
    pub log_level: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));
        let db_path = std::env::var("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("records.db"));

        Self {
            port: env_or("PORT", 3000),
            db_path,
            data_dir,
            db_pool_size: env_or("DB_POOL_SIZE", 4),
            db_busy_timeout_ms: env_or("DB_BUSY_TIMEOUT_MS", 5000),
            rel_depth: env_or("REL_DEPTH", 2),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}
