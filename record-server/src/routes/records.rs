use crate::error::AppError;
use crate::models::parse_ts;
use crate::models::record::{Record, RecordType};
use crate::state::AppState;
use crate::store::{QueryOptions, RecordDraft, RecordFilter, SortOrder, TimeRanges};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_records).post(upsert_record))
        .route("/{id}", get(get_record).put(update_record).delete(delete_record))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    pub id: Option<String>,
    pub filename: Option<String>,
    #[serde(alias = "archiveid")]
    pub archive_id: Option<String>,
    pub host: Option<String>,
    #[serde(alias = "app_set")]
    pub appset: Option<String>,
    #[serde(alias = "backup_set")]
    pub backupset: Option<String>,
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub limit: Option<usize>,
    pub index: Option<usize>,
    pub backup_order: Option<String>,
    pub archive_order: Option<String>,
    pub backup_start: Option<String>,
    pub backup_end: Option<String>,
    pub archive_start: Option<String>,
    pub archive_end: Option<String>,
}

fn parse_time(name: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_ts(&v).map(Some).map_err(|e| {
            AppError::BadRequest(format!("{}: invalid timestamp '{}': {}", name, v, e))
        }),
    }
}

fn parse_order(name: &str, value: Option<String>) -> Result<SortOrder, AppError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(SortOrder::Asc),
        Some(v) => v
            .parse()
            .map_err(|e| AppError::BadRequest(format!("{}: {}", name, e))),
    }
}

impl RecordsQuery {
    pub fn into_filter(self) -> Result<(RecordFilter, QueryOptions), AppError> {
        let record_type: RecordType = match self.record_type {
            Some(t) => t.parse().map_err(|e| AppError::BadRequest(format!("type: {}", e)))?,
            None => RecordType::All,
        };
        let times = TimeRanges {
            backup_start: parse_time("backup_start", self.backup_start)?,
            backup_end: parse_time("backup_end", self.backup_end)?,
            archive_start: parse_time("archive_start", self.archive_start)?,
            archive_end: parse_time("archive_end", self.archive_end)?,
        };
        let options = QueryOptions {
            limit: self.limit.unwrap_or(0),
            offset: self.index.unwrap_or(0),
            backup_order: parse_order("backup_order", self.backup_order)?,
            archive_order: parse_order("archive_order", self.archive_order)?,
            times,
        };
        let filter = RecordFilter {
            id: self.id,
            filename: self.filename,
            archive_id: self.archive_id,
            host: self.host,
            app_set: self.appset,
            backup_set: self.backupset,
            path: self.path,
            record_type,
        };
        Ok((filter, options))
    }
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<Record>>, AppError> {
    let (filter, options) = query.into_filter()?;
    let store = state.records.clone();
    let records = tokio::task::spawn_blocking(move || store.query(&filter, &options))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;
    if records.is_empty() {
        tracing::debug!("[API] No records matched");
        return Err(AppError::NotFound("No records found".into()));
    }
    Ok(Json(records))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Record>, AppError> {
    let store = state.records.clone();
    let record = tokio::task::spawn_blocking(move || store.find_by_id(&id))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;
    match record {
        Some(r) => Ok(Json(r)),
        None => Err(AppError::NotFound("Record not found".into())),
    }
}

async fn upsert_record(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecordDraft>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let store = state.records.clone();
    let id = tokio::task::spawn_blocking(move || store.upsert(&body))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;
    tracing::info!(record_id = %id, "[API] Record saved");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn update_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut body): Json<RecordDraft>,
) -> Result<Json<serde_json::Value>, AppError> {
    body.id = Some(id.clone());
    let store = state.records.clone();
    let updated = tokio::task::spawn_blocking(move || store.update(&body))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;
    if updated {
        Ok(Json(json!({ "id": id })))
    } else {
        Err(AppError::NotFound("Record not found".into()))
    }
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let store = state.records.clone();
    let id2 = id.clone();
    let deleted = tokio::task::spawn_blocking(move || store.delete(&id2))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;
    if deleted {
        tracing::info!(record_id = %id, "[API] Record deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Record not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_map_to_filter() {
        let query = RecordsQuery {
            host: Some("h1".into()),
            record_type: Some("archive".into()),
            limit: Some(10),
            index: Some(20),
            archive_order: Some("desc".into()),
            backup_start: Some("2024-03-01T00:00:00Z".into()),
            backup_end: Some(String::new()),
            ..Default::default()
        };

        let (filter, options) = query.into_filter().expect("valid query");
        assert_eq!(filter.host.as_deref(), Some("h1"));
        assert_eq!(filter.record_type, RecordType::Archive);
        assert_eq!(options.limit, 10);
        assert_eq!(options.offset, 20);
        assert_eq!(options.backup_order, SortOrder::Asc);
        assert_eq!(options.archive_order, SortOrder::Desc);
        assert!(options.times.backup_start.is_some());
        assert!(options.times.backup_end.is_none());
    }

    #[test]
    fn test_bad_query_params_are_rejected() {
        let bad_time = RecordsQuery {
            archive_end: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(bad_time.into_filter(), Err(AppError::BadRequest(_))));

        let bad_type = RecordsQuery {
            record_type: Some("snapshot".into()),
            ..Default::default()
        };
        assert!(matches!(bad_type.into_filter(), Err(AppError::BadRequest(_))));
    }
}
