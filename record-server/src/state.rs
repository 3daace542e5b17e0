use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::store::{RecordStore, RelationDepth};
use std::sync::Arc;

pub struct AppState {
    pub db: DbPool,
    pub records: Arc<RecordStore>,
}

impl AppState {
    pub fn new(db: DbPool, config: &AppConfig) -> Self {
        let depth = RelationDepth(config.rel_depth);
        Self {
            records: Arc::new(RecordStore::new(db.clone(), depth)),
            db,
        }
    }
}
