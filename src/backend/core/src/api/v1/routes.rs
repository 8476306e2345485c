//! V1 API routes.

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::jobs;
use crate::api::AppState;

/// Build the V1 API router.
///
/// All routes are mounted under `/api/v1/`.
///
/// # Endpoints
///
/// - `POST /api/v1/jobs/:handler` - Create a job (and trigger the worker)
/// - `GET /api/v1/jobs/:handler` - List jobs, filterable by status
/// - `GET /api/v1/jobs/:handler/:id` - Get a job by ID
/// - `DELETE /api/v1/jobs/:handler/:id` - Delete a job
/// - `POST /api/v1/jobs/:handler/:id/fail` - Fail a job with a reason
pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/jobs/:handler", post(jobs::create_job))
        .route("/jobs/:handler", get(jobs::list_jobs))
        .route("/jobs/:handler/:id", get(jobs::get_job))
        .route("/jobs/:handler/:id", delete(jobs::delete_job))
        .route("/jobs/:handler/:id/fail", post(jobs::fail_job))
}

/// V1 API route constants for use in clients and documentation.
pub mod paths {
    pub const JOBS: &str = "/api/v1/jobs/:handler";
    pub const JOB: &str = "/api/v1/jobs/:handler/:id";
    pub const JOB_FAIL: &str = "/api/v1/jobs/:handler/:id/fail";
}
