//! Metrics definitions for the admission service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `fm_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `role`: fan, organizer, admin
//! - `outcome`: first_entry, reconnection, organizer_admitted, or an error code
//! - `operation`: create_session, get_active_session, issue_connection
//! - `status`: success, already_exists, error, timeout
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("fm_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Entry spans several provider round trips
        .set_buckets_for_metric(
            Matcher::Prefix("fm_entry".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set entry buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("fm_provider_call".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set provider call buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Admission Metrics
// ============================================================================

/// Record one `enter` call.
///
/// Metric: `fm_entry_total`, `fm_entry_duration_seconds`
/// Labels: `role`, `outcome`
pub fn record_entry(role: &str, outcome: &str, duration: Duration) {
    histogram!("fm_entry_duration_seconds",
        "role" => role.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("fm_entry_total",
        "role" => role.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Provider Metrics
// ============================================================================

/// Record one provider gateway call.
///
/// Metric: `fm_provider_calls_total`, `fm_provider_call_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_provider_call(operation: &str, status: &str, duration: Duration) {
    histogram!("fm_provider_call_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("fm_provider_calls_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `fm_http_requests_total`, `fm_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);

    histogram!("fm_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone()
    )
    .record(duration.as_secs_f64());

    counter!("fm_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Replace meeting ids with a placeholder to bound label cardinality.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/metrics" | "/api/v1/me/fan-meetings/latest" => return path.to_string(),
        _ => {}
    }

    let parts: Vec<&str> = path.split('/').collect();
    // ["", "api", "v1", "fan-meetings", "{id}", action]
    if parts.len() == 6 && path.starts_with("/api/v1/fan-meetings/") {
        if let Some(action) = parts.get(5) {
            if matches!(*action, "enter" | "can-enter" | "apply") {
                return format!("/api/v1/fan-meetings/{{id}}/{action}");
            }
        }
    }

    "/other".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder goes to the no-op recorder.

    #[test]
    fn test_record_entry() {
        record_entry("fan", "first_entry", Duration::from_millis(40));
        record_entry("fan", "SESSION_NOT_FOUND", Duration::from_millis(5));
        record_entry("organizer", "organizer_admitted", Duration::from_millis(120));
    }

    #[test]
    fn test_record_provider_call() {
        record_provider_call("create_session", "success", Duration::from_millis(20));
        record_provider_call("create_session", "already_exists", Duration::from_millis(20));
        record_provider_call("issue_connection", "timeout", Duration::from_secs(10));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(
            normalize_endpoint("/api/v1/fan-meetings/7f0c1e1a-0000-0000-0000-000000000000/enter"),
            "/api/v1/fan-meetings/{id}/enter"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/fan-meetings/abc/can-enter"),
            "/api/v1/fan-meetings/{id}/can-enter"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/fan-meetings/abc/apply"),
            "/api/v1/fan-meetings/{id}/apply"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/me/fan-meetings/latest"),
            "/api/v1/me/fan-meetings/latest"
        );
        assert_eq!(normalize_endpoint("/api/v1/fan-meetings/abc/leave"), "/other");
        assert_eq!(normalize_endpoint("/random"), "/other");
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
