//! Liveness and readiness probes (SPEC_FULL §10.5, §10.6)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Liveness probe response. Always 200 while the process is running —
/// used by an orchestrator to decide whether to restart the pod.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Readiness probe response: 200 only once the persistence layer answers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub database: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub healthy: bool,
    pub message: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.store().health_check().await {
        Ok(()) => DependencyStatus {
            healthy: true,
            message: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "readiness check: persistence layer unhealthy");
            DependencyStatus {
                healthy: false,
                message: Some(e.to_string()),
            }
        }
    };

    let ready = database.healthy;
    let response = ReadinessResponse {
        ready,
        service: state.config().service.name.clone(),
        database,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_always_reports_healthy() {
        let state = crate::state::test_state().await;
        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_reports_ready_with_memory_store() {
        let state = crate::state::test_state().await;
        let response = readiness(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
