//! HTTP routes for the admission service.
//!
//! Defines the Axum router and application state.

use crate::auth::IdentityResolver;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_caller, AuthState};
use crate::repositories::AdmissionRepository;
use crate::services::AdmissionService;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admission orchestrator.
    pub admission: Arc<AdmissionService>,

    /// Storage, used directly only by the health check.
    pub repo: Arc<dyn AdmissionRepository>,
}

/// Build the application routes.
///
/// - `/health` - Health check (storage ping) - public
/// - `/metrics` - Prometheus metrics - public
/// - `/api/v1/fan-meetings/:meeting_id/enter` - authenticated
/// - `/api/v1/fan-meetings/:meeting_id/can-enter` - authenticated, fans only
/// - `/api/v1/fan-meetings/:meeting_id/apply` - authenticated, fans only
/// - `/api/v1/me/fan-meetings/latest` - authenticated, fans only
/// - TraceLayer, 30 second request timeout, HTTP metrics (outermost)
pub fn build_routes(
    state: Arc<AppState>,
    resolver: Arc<dyn IdentityResolver>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let auth_state = Arc::new(AuthState { resolver });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            "/api/v1/fan-meetings/:meeting_id/enter",
            post(handlers::enter),
        )
        .route(
            "/api/v1/fan-meetings/:meeting_id/can-enter",
            get(handlers::can_enter),
        )
        .route(
            "/api/v1/fan-meetings/:meeting_id/apply",
            post(handlers::apply),
        )
        .route("/api/v1/me/fan-meetings/latest", get(handlers::next_meeting))
        .route_layer(middleware::from_fn_with_state(auth_state, require_caller))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees framework rejections too)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
