//! State-of-the-world discovery stream loop
//!
//! One loop serves every discovery stream, whether a single-type service (CDS, RDS, LDS,
//! EDS) or the aggregated one. Each stream:
//!
//! - registers with the [`CallbackRegistry`](crate::xds::callbacks::CallbackRegistry) and
//!   identifies itself on the first request that carries a node id
//! - subscribes to that node's slot in the snapshot cache and pushes every newer snapshot
//!   for the type URLs the proxy asked for
//! - tracks the last version and nonce sent per type URL so ACKs are recognised and skipped
//! - logs NACKs and keeps the rejected version until a newer snapshot lands
//!
//! When the stream ends the registry is told, and the node's cache slot is released if this
//! was its last stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;
use tracing::{debug, error, info, warn};

use crate::xds::callbacks::StreamId;
use crate::xds::distributor::spawn_new_node_waiter;
use crate::xds::resources::{type_label, ENDPOINT_TYPE_URL, ROUTE_TYPE_URL, SERVED_TYPE_URLS};
use crate::xds::snapshot::{Snapshot, SnapshotSlot};
use crate::xds::state::XdsState;

pub type DiscoveryResponseStream = ReceiverStream<std::result::Result<DiscoveryResponse, Status>>;

#[derive(Debug, Clone)]
struct LastSent {
    version: String,
    nonce: String,
}

#[derive(Debug, Default)]
struct Subscription {
    resource_names: Vec<String>,
    last_sent: Option<LastSent>,
}

/// Build the response for `type_url` out of a snapshot.
///
/// Route and endpoint requests naming specific resources only get those; clusters and
/// listeners are always sent in full.
pub fn build_response(snapshot: &Snapshot, type_url: &str, resource_names: &[String]) -> DiscoveryResponse {
    let filter_by_name = matches!(type_url, ROUTE_TYPE_URL | ENDPOINT_TYPE_URL) && !resource_names.is_empty();
    let resources = snapshot
        .resources(type_url)
        .iter()
        .filter(|resource| !filter_by_name || resource_names.iter().any(|name| name == &resource.name))
        .map(|resource| resource.resource.clone())
        .collect();

    DiscoveryResponse {
        version_info: snapshot.version().to_string(),
        resources,
        canary: false,
        type_url: type_url.to_string(),
        nonce: uuid::Uuid::new_v4().to_string(),
        control_plane: None,
        resource_errors: Vec::new(),
    }
}

/// Serve one discovery stream until the client goes away or the control plane shuts down.
///
/// `default_type_url` fills in requests that omit their type URL, which single-type
/// services allow.
pub fn run_stream_loop<S>(
    state: Arc<XdsState>,
    in_stream: S,
    label: &'static str,
    default_type_url: Option<&'static str>,
) -> DiscoveryResponseStream
where
    S: Stream<Item = std::result::Result<DiscoveryRequest, Status>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let (stream_id, waiter) = state.registry.on_stream_open(label).await;
        spawn_new_node_waiter(state.clone(), waiter);

        let mut session = StreamSession {
            state,
            label,
            stream_id,
            default_type_url,
            tx,
            node_id: None,
            snapshot_rx: None,
            subscriptions: BTreeMap::new(),
        };
        session.run(in_stream).await;
        session.close().await;
    });

    ReceiverStream::new(rx)
}

struct StreamSession {
    state: Arc<XdsState>,
    label: &'static str,
    stream_id: StreamId,
    default_type_url: Option<&'static str>,
    tx: mpsc::Sender<std::result::Result<DiscoveryResponse, Status>>,
    node_id: Option<String>,
    snapshot_rx: Option<watch::Receiver<SnapshotSlot>>,
    subscriptions: BTreeMap<String, Subscription>,
}

async fn snapshot_changed(
    receiver: &mut Option<watch::Receiver<SnapshotSlot>>,
) -> std::result::Result<(), watch::error::RecvError> {
    match receiver {
        Some(receiver) => receiver.changed().await,
        None => std::future::pending().await,
    }
}

impl StreamSession {
    async fn run<S>(&mut self, mut in_stream: S)
    where
        S: Stream<Item = std::result::Result<DiscoveryRequest, Status>> + Unpin,
    {
        let shutdown = self.state.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(stream = %self.label, "Shutting down discovery stream");
                    break;
                }
                result = in_stream.next() => {
                    match result {
                        Some(Ok(request)) => {
                            if !self.on_request(request).await {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(stream = %self.label, "Error receiving discovery request: {}", e);
                            let _ = self.tx.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!(stream = %self.label, node_id = ?self.node_id, "Discovery stream ended by client");
                            break;
                        }
                    }
                }
                changed = snapshot_changed(&mut self.snapshot_rx) => {
                    match changed {
                        Ok(()) => {
                            if !self.push_subscribed().await {
                                break;
                            }
                        }
                        Err(_) => {
                            debug!(stream = %self.label, "Snapshot slot closed");
                            self.snapshot_rx = None;
                        }
                    }
                }
            }
        }
    }

    /// Returns `false` once the response receiver is gone.
    async fn on_request(&mut self, request: DiscoveryRequest) -> bool {
        let type_url = match (request.type_url.is_empty(), self.default_type_url) {
            (true, Some(default)) => default.to_string(),
            _ => request.type_url.clone(),
        };
        let node_id = request.node.as_ref().map(|node| node.id.as_str()).filter(|id| !id.is_empty());

        info!(
            type_url = %type_url,
            version_info = %request.version_info,
            node_id = ?node_id,
            stream = %self.label,
            "Received discovery request"
        );

        // Hold the node's slot before identifying so a cold start assignment has a target.
        let pending_watch = match (&self.node_id, node_id) {
            (None, Some(node_id)) => Some(self.state.snapshots.watch(node_id)),
            _ => None,
        };
        match self.state.registry.on_stream_request(self.stream_id, node_id, &type_url).await {
            Some(identified) => {
                self.snapshot_rx = pending_watch;
                self.node_id = Some(identified.node_id);
            }
            None => {
                if let (Some(watch), Some(node_id)) = (pending_watch, node_id) {
                    drop(watch);
                    self.state.snapshots.clear_node(node_id);
                }
            }
        }

        if !SERVED_TYPE_URLS.contains(&type_url.as_str()) {
            warn!(type_url = %type_url, stream = %self.label, "Ignoring request for unsupported resource type");
            return true;
        }

        let subscription = self.subscriptions.entry(type_url.clone()).or_default();
        let names_changed = subscription.resource_names != request.resource_names;
        subscription.resource_names = request.resource_names.clone();

        if let Some(error_detail) = request.error_detail.as_ref() {
            self.state.metrics.record_nack(type_label(&type_url));
            warn!(
                type_url = %type_url,
                nonce = %request.response_nonce,
                error_code = error_detail.code,
                error_message = %error_detail.message,
                node_id = ?self.node_id,
                stream = %self.label,
                "[NACK] Envoy rejected previous response"
            );
            return true;
        }

        if let Some(last) = subscription.last_sent.as_ref() {
            if !request.response_nonce.is_empty() && request.response_nonce != last.nonce {
                debug!(
                    type_url = %type_url,
                    nonce = %request.response_nonce,
                    stream = %self.label,
                    "Ignoring request with stale nonce"
                );
                return true;
            }
            if request.response_nonce == last.nonce && request.version_info == last.version && !names_changed {
                debug!(
                    type_url = %type_url,
                    version = %request.version_info,
                    nonce = %request.response_nonce,
                    node_id = ?self.node_id,
                    stream = %self.label,
                    "[ACK] Skipping duplicate discovery request"
                );
                return true;
            }
        }

        match self.current_snapshot() {
            Some(snapshot) => self.send(&snapshot, &type_url).await,
            None => {
                debug!(type_url = %type_url, node_id = ?self.node_id, stream = %self.label, "No snapshot for node yet, response deferred");
                true
            }
        }
    }

    fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_rx.as_ref().and_then(|receiver| receiver.borrow().clone())
    }

    /// Push the node's snapshot for every subscribed type that has not seen it yet.
    async fn push_subscribed(&mut self) -> bool {
        let Some(snapshot) = self.current_snapshot() else {
            return true;
        };

        let pending: Vec<&'static str> = SERVED_TYPE_URLS
            .into_iter()
            .filter(|type_url| {
                self.subscriptions.get(*type_url).is_some_and(|subscription| {
                    subscription.last_sent.as_ref().is_none_or(|last| last.version != snapshot.version())
                })
            })
            .collect();

        for type_url in pending {
            if !self.send(&snapshot, type_url).await {
                return false;
            }
        }
        true
    }

    async fn send(&mut self, snapshot: &Snapshot, type_url: &str) -> bool {
        let Some(subscription) = self.subscriptions.get_mut(type_url) else {
            return true;
        };

        let response = build_response(snapshot, type_url, &subscription.resource_names);
        info!(
            type_url = %response.type_url,
            version = %response.version_info,
            nonce = %response.nonce,
            resource_count = response.resources.len(),
            node_id = ?self.node_id,
            stream = %self.label,
            "Sending discovery response"
        );
        subscription.last_sent =
            Some(LastSent { version: response.version_info.clone(), nonce: response.nonce.clone() });

        if self.tx.send(Ok(response)).await.is_err() {
            error!(stream = %self.label, "Discovery response receiver dropped");
            return false;
        }
        true
    }

    async fn close(mut self) {
        // Release the watch first so the node's slot can be cleared.
        self.snapshot_rx = None;
        if let Some(node_id) = self.state.registry.on_stream_closed(self.stream_id).await {
            self.state.snapshots.clear_node(&node_id);
        }
        debug!(stream = %self.label, node_id = ?self.node_id, "Discovery stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use envoy_types::pb::envoy::config::core::v3::Node;
    use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
    use prost::Message;

    use crate::config::AppConfig;
    use crate::domain::route::ATTR_CLUSTER;
    use crate::domain::{Attributes, Cluster, Listener, Route};
    use crate::storage::{EntityCache, InMemoryEntityStore};
    use crate::xds::resources::{CLUSTER_TYPE_URL, LISTENER_TYPE_URL};

    type RequestSender = mpsc::Sender<std::result::Result<DiscoveryRequest, Status>>;

    async fn state() -> Arc<XdsState> {
        let store = Arc::new(InMemoryEntityStore::with_entities(
            vec![Cluster::new("people", "people.internal", 8080)],
            vec![
                Route::new("people", "web", "prefix", "/people")
                    .with_attributes(Attributes::from_iter([(ATTR_CLUSTER, "people")])),
                Route::new("admin", "internal", "prefix", "/admin")
                    .with_attributes(Attributes::from_iter([(ATTR_CLUSTER, "people")])),
            ],
            vec![Listener::new("web", 80, "web"), Listener::new("internal", 81, "internal")],
        ));
        let (tx, _rx) = mpsc::channel(8);
        let entities = Arc::new(EntityCache::new(store, tx));
        entities.refresh().await;
        let state = Arc::new(XdsState::new(AppConfig::default(), entities));
        state.compile("notification").await;
        state
    }

    fn open(state: &Arc<XdsState>, label: &'static str, default: Option<&'static str>) -> (RequestSender, DiscoveryResponseStream) {
        let (tx, rx) = mpsc::channel(16);
        let responses = run_stream_loop(state.clone(), ReceiverStream::new(rx), label, default);
        (tx, responses)
    }

    fn request(node: &str, type_url: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Some(Node { id: node.to_string(), ..Default::default() }),
            type_url: type_url.to_string(),
            ..Default::default()
        }
    }

    fn ack(response: &DiscoveryResponse) -> DiscoveryRequest {
        DiscoveryRequest {
            version_info: response.version_info.clone(),
            response_nonce: response.nonce.clone(),
            type_url: response.type_url.clone(),
            ..Default::default()
        }
    }

    async fn next(responses: &mut DiscoveryResponseStream) -> DiscoveryResponse {
        tokio::time::timeout(Duration::from_secs(5), responses.next())
            .await
            .expect("response in time")
            .expect("stream open")
            .expect("ok response")
    }

    async fn assert_silent(responses: &mut DiscoveryResponseStream) {
        let waited = tokio::time::timeout(Duration::from_millis(200), responses.next()).await;
        assert!(waited.is_err(), "unexpected response: {:?}", waited);
    }

    #[tokio::test]
    async fn test_new_node_receives_latest_snapshot() {
        let state = state().await;
        let (tx, mut responses) = open(&state, "ADS", None);

        tx.send(Ok(request("envoy-1", CLUSTER_TYPE_URL))).await.unwrap();
        let response = next(&mut responses).await;

        assert_eq!(response.type_url, CLUSTER_TYPE_URL);
        assert_eq!(response.resources.len(), 1);
        assert_eq!(Some(response.version_info.as_str()), state.latest().as_ref().map(|s| s.version()));
        assert!(uuid::Uuid::parse_str(&response.nonce).is_ok());
        assert_silent(&mut responses).await;
    }

    #[tokio::test]
    async fn test_ack_is_skipped_and_new_snapshot_pushed() {
        let state = state().await;
        let (tx, mut responses) = open(&state, "ADS", None);

        tx.send(Ok(request("envoy-1", LISTENER_TYPE_URL))).await.unwrap();
        let first = next(&mut responses).await;
        tx.send(Ok(ack(&first))).await.unwrap();
        assert_silent(&mut responses).await;

        let snapshot = state.compile("notification").await;
        state.publish(&snapshot).await;
        let pushed = next(&mut responses).await;
        assert_eq!(pushed.version_info, snapshot.version());
        assert_ne!(pushed.nonce, first.nonce);
    }

    #[tokio::test]
    async fn test_nack_keeps_version_until_next_snapshot() {
        let state = state().await;
        let (tx, mut responses) = open(&state, "ADS", None);

        tx.send(Ok(request("envoy-1", CLUSTER_TYPE_URL))).await.unwrap();
        let first = next(&mut responses).await;

        let mut nack = ack(&first);
        nack.version_info = String::new();
        nack.error_detail = Some(envoy_types::pb::google::rpc::Status {
            code: 3,
            message: "bad cluster".into(),
            ..Default::default()
        });
        tx.send(Ok(nack)).await.unwrap();
        assert_silent(&mut responses).await;

        let snapshot = state.compile("notification").await;
        state.publish(&snapshot).await;
        assert_eq!(next(&mut responses).await.version_info, snapshot.version());
    }

    #[tokio::test]
    async fn test_route_responses_follow_requested_names() {
        let state = state().await;
        let (tx, mut responses) = open(&state, "RDS", Some(ROUTE_TYPE_URL));

        let mut subscribe = request("envoy-1", "");
        subscribe.resource_names = vec!["internal".into()];
        tx.send(Ok(subscribe)).await.unwrap();

        let response = next(&mut responses).await;
        assert_eq!(response.type_url, ROUTE_TYPE_URL);
        let names: Vec<String> = response
            .resources
            .iter()
            .map(|any| RouteConfiguration::decode(any.value.as_slice()).unwrap().name)
            .collect();
        assert_eq!(names, vec!["internal"]);

        let mut widen = ack(&response);
        widen.resource_names = vec!["internal".into(), "web".into()];
        tx.send(Ok(widen)).await.unwrap();
        assert_eq!(next(&mut responses).await.resources.len(), 2);
    }

    #[tokio::test]
    async fn test_unidentified_stream_waits_for_node() {
        let state = state().await;
        let (tx, mut responses) = open(&state, "CDS", Some(CLUSTER_TYPE_URL));

        tx.send(Ok(DiscoveryRequest::default())).await.unwrap();
        assert_silent(&mut responses).await;
        assert!(state.registry.nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_closing_last_stream_releases_node() {
        let state = state().await;
        let (tx, mut responses) = open(&state, "ADS", None);
        tx.send(Ok(request("envoy-1", CLUSTER_TYPE_URL))).await.unwrap();
        next(&mut responses).await;
        assert_eq!(state.snapshots.node_ids(), vec!["envoy-1"]);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !state.snapshots.node_ids().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("node slot released");
        assert!(state.registry.nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let state = state().await;
        let (_tx, mut responses) = open(&state, "ADS", None);
        state.shutdown.cancel();
        let ended = tokio::time::timeout(Duration::from_secs(5), responses.next()).await.unwrap();
        assert!(ended.is_none());
    }

    #[test]
    fn test_build_response_sends_clusters_in_full() {
        let snapshot = Snapshot::new(1, Default::default());
        let response = build_response(&snapshot, CLUSTER_TYPE_URL, &["ignored".to_string()]);
        assert_eq!(response.version_info, snapshot.version());
        assert!(response.resources.is_empty());
        assert!(response.control_plane.is_none());
    }
}
