//! Unversioned request handlers: health, metrics, and the worker trigger.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use tracing::debug;

use super::AppState;
use crate::error::{ConveyorError, ErrorCode};
use crate::jobs::{DispatchOutcome, TRIGGER_TOKEN_HEADER};

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "handlers": state.registry.handlers(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

/// The inbound worker trigger.
///
/// Always terminates the request without a body — no response payload is
/// meaningful to the caller. Only a bad token or an unknown handler
/// produce an error status.
///
/// The guarded entry point runs in a detached task: the self-trigger
/// request uses a short timeout and hangs up long before a budget-bounded
/// invocation finishes, and an aborted connection must not abort the
/// invocation with it.
pub async fn trigger_worker(
    State(state): State<AppState>,
    Path(handler): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ConveyorError> {
    let dispatcher = state
        .registry
        .get(&handler)
        .ok_or_else(|| {
            ConveyorError::new(
                ErrorCode::JobNotFound,
                format!("No such handler: {}", handler),
            )
        })?
        .clone();

    let token = headers
        .get(TRIGGER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !dispatcher.verify_token(&token) {
        return Err(ConveyorError::invalid_token(&handler));
    }

    tokio::spawn(async move {
        match dispatcher.maybe_handle(&token).await {
            Ok(DispatchOutcome::Ran(report)) => {
                debug!(
                    handler = %handler,
                    items = report.items_processed,
                    "Trigger handled"
                );
            }
            Ok(DispatchOutcome::LockHeld | DispatchOutcome::QueueEmpty) => {}
            // The failure trap already failed the job; nothing to surface
            // to an absent caller
            Err(error) => error.log(),
        }
    });

    Ok(StatusCode::NO_CONTENT)
}
