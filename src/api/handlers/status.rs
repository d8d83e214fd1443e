use axum::{extract::State, http::header, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::xds::resources::{CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub clusters: Vec<String>,
    pub routes: Vec<String>,
    pub listeners: Vec<String>,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_id: String,
    /// Version of the snapshot assigned to the node, if any
    pub version: Option<String>,
    pub connected: bool,
}

/// Effective configuration rendered as YAML
pub async fn config_handler(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let body = serde_yaml::to_string(&state.xds_state.config)?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], body))
}

pub async fn snapshot_handler(State(state): State<ApiState>) -> Result<Json<SnapshotResponse>, ApiError> {
    let snapshot = state
        .xds_state
        .latest()
        .ok_or_else(|| ApiError::service_unavailable("no configuration snapshot has been built yet"))?;

    let names = |type_url: &str| -> Vec<String> {
        snapshot.resource_names(type_url).into_iter().map(str::to_string).collect()
    };
    Ok(Json(SnapshotResponse {
        version: snapshot.version().to_string(),
        created_at: snapshot.created_at(),
        clusters: names(CLUSTER_TYPE_URL),
        routes: names(ROUTE_TYPE_URL),
        listeners: names(LISTENER_TYPE_URL),
        endpoints: names(ENDPOINT_TYPE_URL),
    }))
}

/// Nodes holding a snapshot slot or an open stream, sorted by id.
pub async fn nodes_handler(State(state): State<ApiState>) -> Json<Vec<NodeStatus>> {
    let connected = state.xds_state.registry.nodes().await;

    let mut node_ids = state.xds_state.snapshots.node_ids();
    node_ids.extend(connected.iter().cloned());
    node_ids.sort();
    node_ids.dedup();

    let nodes = node_ids
        .into_iter()
        .map(|node_id| NodeStatus {
            version: state.xds_state.snapshots.get_snapshot(&node_id).map(|s| s.version().to_string()),
            connected: connected.contains(&node_id),
            node_id,
        })
        .collect();
    Json(nodes)
}
