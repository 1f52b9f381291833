//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. Only bounded operational
//! labels are exported, never participant ids or tokens.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
#[tracing::instrument(skip_all, name = "fm.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
