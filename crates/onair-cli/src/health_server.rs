use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use onair_scheduler::Orchestrator;
use serde_json::json;
use tracing::warn;

pub(crate) const HEALTHCHECK_ENDPOINT: &str = "/healthcheck";

pub(crate) fn build_health_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route(HEALTHCHECK_ENDPOINT, get(handle_healthcheck))
        .with_state(orchestrator)
}

async fn handle_healthcheck(State(orchestrator): State<Arc<Orchestrator>>) -> Response {
    match orchestrator.health(Utc::now()).await {
        Ok(report) => {
            let status = if report.healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(report)).into_response()
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "health check could not be evaluated");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "healthy": false,
                    "error": format!("{error:#}"),
                })),
            )
                .into_response()
        }
    }
}
