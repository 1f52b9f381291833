//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Liveness and readiness check.
///
/// Pings storage and always answers 200 so the orchestrator can read the
/// body:
///
/// ```json
/// { "status": "healthy", "database": "healthy" }
/// ```
#[instrument(skip_all, name = "fm.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_healthy = state.repo.ping().await.is_ok();

    let (status, database) = if db_healthy {
        ("healthy", "healthy")
    } else {
        tracing::warn!(target: "fm.health", "Storage ping failed");
        ("unhealthy", "unhealthy")
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: Some(database.to_string()),
    })
}
