//! Liveness and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::routes::ApiState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Returns 200 OK whenever the admin server is responding.
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok".to_string(), version: None }))
}

/// Ready once the first snapshot has been built; 503 before that.
pub async fn ready_handler(State(state): State<ApiState>) -> Result<Json<HealthResponse>, ApiError> {
    let snapshot = state
        .xds_state
        .latest()
        .ok_or_else(|| ApiError::service_unavailable("no configuration snapshot has been built yet"))?;

    Ok(Json(HealthResponse { status: "ready".to_string(), version: Some(snapshot.version().to_string()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler_returns_ok() {
        let (status, Json(response)) = health_handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "ok");
        assert!(response.version.is_none());
    }
}
