//! HTTP snapshot surface.
//!
//! A deliberately narrow read-only API next to the Prometheus endpoint:
//! device listing, per-device health snapshots, and a liveness probe. The
//! full management surface lives outside the core.

use crate::scheduler::Pipeline;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Build the router serving `/metrics`, `/health`, and the v1 snapshots.
pub fn router(pipeline: Arc<Pipeline>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = metrics.clone();
                async move { handle.render() }
            }),
        )
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/:device_id", get(device_health))
        .with_state(pipeline)
}

async fn list_devices(State(pipeline): State<Arc<Pipeline>>) -> impl IntoResponse {
    Json(pipeline.list_devices())
}

async fn device_health(
    State(pipeline): State<Arc<Pipeline>>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match pipeline.device_health(&device_id) {
        Some(health) => Json(health).into_response(),
        None => (StatusCode::NOT_FOUND, "device not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IoShelferConfig;
    use crate::events::EventBus;
    use crate::history::MemoryHistory;
    use crate::remediation::LoggingActuator;
    use crate::shutdown::ShutdownCoordinator;

    fn pipeline() -> Arc<Pipeline> {
        Pipeline::new(
            IoShelferConfig::development(),
            Arc::new(MemoryHistory::new()),
            Arc::new(LoggingActuator),
            Arc::new(EventBus::new()),
            ShutdownCoordinator::new(),
        )
    }

    #[tokio::test]
    async fn test_list_devices_empty() {
        let response = list_devices(State(pipeline())).await;
        // Just a smoke check that the handler produces a response.
        let _ = response.into_response();
    }

    #[tokio::test]
    async fn test_device_health_missing_is_not_found() {
        let response = device_health(State(pipeline()), Path("ghost".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
