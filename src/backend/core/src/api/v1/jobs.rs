//! Job management handlers.
//!
//! All handlers return `Result<impl IntoResponse, ConveyorError>` so that
//! errors are converted to appropriate HTTP status codes via the
//! `IntoResponse` implementation on `ConveyorError`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{ApiResponse, AppState};
use crate::error::{ConveyorError, ErrorCode};
use crate::jobs::{Dispatcher, Job, JobId, JobStatus};
use crate::store::{ListOrder, ListOrderBy};

fn resolve_dispatcher<'a>(
    state: &'a AppState,
    handler: &str,
) -> Result<&'a Arc<Dispatcher>, ConveyorError> {
    state.registry.get(handler).ok_or_else(|| {
        ConveyorError::new(
            ErrorCode::JobNotFound,
            format!("No such handler: {}", handler),
        )
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Create
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn create_job(
    State(state): State<AppState>,
    Path(handler): Path<String>,
    Json(attrs): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<impl IntoResponse, ConveyorError> {
    let dispatcher = resolve_dispatcher(&state, &handler)?;
    let job = dispatcher.create_job(attrs).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(job))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// List
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct ListQuery {
    /// Comma-separated status filter, e.g. `queued,processing`
    pub status: Option<String>,
    #[serde(default)]
    pub order: ListOrder,
    #[serde(default)]
    pub orderby: ListOrderBy,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Path(handler): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ConveyorError> {
    let dispatcher = resolve_dispatcher(&state, &handler)?;

    let statuses = match &query.status {
        Some(raw) => Some(
            raw.split(',')
                .filter(|part| !part.is_empty())
                .map(str::parse::<JobStatus>)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };

    let jobs: Vec<Job> = dispatcher
        .store()
        .list(statuses.as_deref(), query.order, query.orderby)
        .await?
        .unwrap_or_default();

    Ok(Json(ApiResponse::success(jobs)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Get / Delete / Fail
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn get_job(
    State(state): State<AppState>,
    Path((handler, id)): Path<(String, JobId)>,
) -> Result<impl IntoResponse, ConveyorError> {
    let dispatcher = resolve_dispatcher(&state, &handler)?;
    let job = dispatcher
        .store()
        .get(Some(id))
        .await?
        .ok_or_else(|| ConveyorError::job_not_found(id))?;

    Ok(Json(ApiResponse::success(job)))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path((handler, id)): Path<(String, JobId)>,
) -> Result<impl IntoResponse, ConveyorError> {
    let dispatcher = resolve_dispatcher(&state, &handler)?;
    let job = dispatcher
        .store()
        .get(Some(id))
        .await?
        .ok_or_else(|| ConveyorError::job_not_found(id))?;

    dispatcher.store().delete(&job).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "id": id,
        "deleted": true
    }))))
}

#[derive(Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

pub async fn fail_job(
    State(state): State<AppState>,
    Path((handler, id)): Path<(String, JobId)>,
    Json(request): Json<FailRequest>,
) -> Result<impl IntoResponse, ConveyorError> {
    if request.reason.trim().is_empty() {
        return Err(ConveyorError::validation("Failure reason cannot be empty"));
    }

    let dispatcher = resolve_dispatcher(&state, &handler)?;
    let mut job = dispatcher
        .store()
        .get(Some(id))
        .await?
        .ok_or_else(|| ConveyorError::job_not_found(id))?;

    if !dispatcher.store().fail(&mut job, &request.reason).await? {
        return Err(ConveyorError::new(
            ErrorCode::InvalidInput,
            format!("Job {} is already terminal", id),
        ));
    }

    Ok(Json(ApiResponse::success(job)))
}
