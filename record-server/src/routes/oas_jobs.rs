use crate::error::AppError;
use crate::models::{oas_job, record};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/{job_id}", get(get_jobs))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub index: Option<usize>,
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<oas_job::OasJob>>, AppError> {
    let db = state.db.clone();
    let jobs = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        Ok::<_, anyhow::Error>(oas_job::find_all(
            &conn,
            page.limit.unwrap_or(0),
            page.index.unwrap_or(0),
        )?)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    if jobs.is_empty() {
        return Err(AppError::NotFound("No jobs found".into()));
    }
    Ok(Json(jobs))
}

async fn get_jobs(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<oas_job::OasJob>>, AppError> {
    let db = state.db.clone();
    let jid = job_id.clone();
    let jobs = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        Ok::<_, anyhow::Error>(oas_job::find_by_job_id(&conn, &jid, 0, 0)?)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;
    if jobs.is_empty() {
        tracing::debug!(job_id = %job_id, "[API] No jobs with this job id");
        return Err(AppError::NotFound(format!("No jobs with job id {}", job_id)));
    }
    Ok(Json(jobs))
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<oas_job::CreateOasJob>,
) -> Result<(StatusCode, Json<oas_job::OasJob>), AppError> {
    if body.job_id.is_empty() {
        return Err(AppError::BadRequest("job_id is required".into()));
    }
    if !oas_job::is_known_job_type(&body.job_type) {
        return Err(AppError::BadRequest(format!(
            "job_type must be one of {}",
            oas_job::JOB_TYPES.join(", ")
        )));
    }

    let db = state.db.clone();
    let job = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        if let Some(record_id) = &body.record_id {
            if !record::exists(&conn, record_id)? {
                return Ok(None);
            }
        }
        Ok::<_, anyhow::Error>(Some(oas_job::create(&conn, &body)?))
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    match job {
        Some(job) => {
            tracing::info!(job_id = %job.job_id, "[API] Job created");
            Ok((StatusCode::CREATED, Json(job)))
        }
        None => Err(AppError::Unprocessable("record_id does not name an existing record".into())),
    }
}
