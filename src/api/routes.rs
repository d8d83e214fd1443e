use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::xds::XdsState;

use super::handlers::{config_handler, health_handler, nodes_handler, ready_handler, snapshot_handler};

#[derive(Clone)]
pub struct ApiState {
    pub xds_state: Arc<XdsState>,
}

pub fn build_router(state: Arc<XdsState>) -> Router {
    let api_state = ApiState { xds_state: state };

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/config", get(config_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/nodes", get(nodes_handler))
        .with_state(api_state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use tokio::sync::mpsc;

    use crate::api::handlers::health::HealthResponse;
    use crate::api::handlers::status::{NodeStatus, SnapshotResponse};
    use crate::config::AppConfig;
    use crate::domain::{Cluster, Listener};
    use crate::storage::{EntityCache, InMemoryEntityStore};

    async fn state() -> Arc<XdsState> {
        let store = Arc::new(InMemoryEntityStore::with_entities(
            vec![Cluster::new("people", "people.internal", 8080)],
            Vec::new(),
            vec![Listener::new("web", 80, "web")],
        ));
        let (tx, _rx) = mpsc::channel(8);
        let entities = Arc::new(EntityCache::new(store, tx));
        entities.refresh().await;
        Arc::new(XdsState::new(AppConfig::default(), entities))
    }

    #[tokio::test]
    async fn test_healthz() {
        let server = TestServer::new(build_router(state().await)).unwrap();
        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.json::<HealthResponse>().status, "ok");
    }

    #[tokio::test]
    async fn test_ready_waits_for_first_snapshot() {
        let state = state().await;
        let server = TestServer::new(build_router(state.clone())).unwrap();

        server.get("/ready").await.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        server.get("/snapshot").await.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let snapshot = state.compile("notification").await;
        let response = server.get("/ready").await;
        response.assert_status_ok();
        assert_eq!(response.json::<HealthResponse>().version.as_deref(), Some(snapshot.version()));
    }

    #[tokio::test]
    async fn test_snapshot_lists_resource_names() {
        let state = state().await;
        state.compile("notification").await;
        let server = TestServer::new(build_router(state)).unwrap();

        let body = server.get("/snapshot").await.json::<SnapshotResponse>();
        assert_eq!(body.clusters, vec!["people"]);
        assert_eq!(body.listeners, vec!["port_80"]);
        assert!(body.routes.is_empty());
        assert!(body.endpoints.is_empty());
        assert!(body.version.ends_with("-V1"));
    }

    #[tokio::test]
    async fn test_nodes_report_assigned_versions() {
        let state = state().await;
        let snapshot = state.compile("notification").await;
        let (stream, _waiter) = state.registry.on_stream_open("ADS").await;
        let _watcher = state.snapshots.watch("envoy-1");
        state.registry.on_stream_request(stream, Some("envoy-1"), "").await;
        state.publish(&snapshot).await;
        state.snapshots.watch("envoy-2");

        let server = TestServer::new(build_router(state)).unwrap();
        let nodes = server.get("/nodes").await.json::<Vec<NodeStatus>>();
        assert_eq!(
            nodes,
            vec![
                NodeStatus { node_id: "envoy-1".into(), version: Some(snapshot.version().to_string()), connected: true },
                NodeStatus { node_id: "envoy-2".into(), version: None, connected: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_config_rendered_as_yaml() {
        let server = TestServer::new(build_router(state().await)).unwrap();
        let response = server.get("/config").await;
        response.assert_status_ok();
        let config: AppConfig = serde_yaml::from_str(&response.text()).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
