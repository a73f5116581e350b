//! HTTP handlers

use axum::Json;
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus text exposition of the operator registry
#[cfg(feature = "metrics")]
pub async fn metrics() -> Result<String, axum::http::StatusCode> {
    use prometheus_client::encoding::text::encode;

    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_version() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn test_metrics_renders_registry() {
        crate::controller::metrics::inc_resource_operation("Service", "created");
        let body = metrics().await.unwrap();
        assert!(body.contains("app_operator_resource_operations_total"));
    }
}
