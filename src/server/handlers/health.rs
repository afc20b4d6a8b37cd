//! `GET /health` and `GET /health-check`.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::super::AppState;
use crate::health::{ExternalStatus, HealthStatus};
use crate::limiter::LimiterStats;

/// Error body for `/health-check` failures; details stay in the logs.
pub const HEALTH_CHECK_ERROR: &str =
    "An issue occurred while checking system health or external services.";

/// Fallback error for `/health` when no reason was recorded.
pub const HEALTH_ERROR: &str = "An issue occurred while checking system status.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: HealthStatus,
    cpu_usage: String,
    free_memory: String,
    external_services: BTreeMap<String, ExternalStatus>,
    uploads: LimiterStats,
}

fn format_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Resource usage plus dependency status.
pub async fn health(State(state): State<AppState>) -> Response {
    let report = state.health.report().await;

    match report.status {
        HealthStatus::Healthy => {
            let mut external_services = BTreeMap::new();
            external_services.insert(
                report.external_service_name.clone(),
                report.external_service_status,
            );

            Json(HealthBody {
                status: report.status,
                cpu_usage: format_percent(report.cpu_usage_percent),
                free_memory: format_percent(report.free_memory_percent),
                external_services,
                uploads: state.limiter.stats(),
            })
            .into_response()
        }
        HealthStatus::Unhealthy => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "unhealthy",
                "error": report.error.unwrap_or_else(|| HEALTH_ERROR.to_string()),
            })),
        )
            .into_response(),
    }
}

/// Data from the external dependency, fetched through the resilient client.
pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.health.external_data().await {
        Ok(data) => Json(serde_json::json!({
            "status": "healthy",
            "externalServiceData": data,
        }))
        .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "unhealthy",
                "error": HEALTH_CHECK_ERROR,
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(Some(12.345)), "12.35%");
        assert_eq!(format_percent(Some(0.0)), "0.00%");
        assert_eq!(format_percent(None), "unknown");
    }
}
