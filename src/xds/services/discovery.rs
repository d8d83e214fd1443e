use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryService;
use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::AggregatedDiscoveryService, DeltaDiscoveryRequest,
    DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryService;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryService;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryService;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use super::stream::{build_response, run_stream_loop};
use crate::xds::resources::{
    type_label, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};
use crate::xds::state::XdsState;

type SotwStream = Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
type DeltaStream = Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

/// Serves CDS, RDS, LDS, EDS and ADS from the shared snapshot state.
///
/// Only the state-of-the-world variants are supported; delta requests are refused with
/// `UNIMPLEMENTED`.
#[derive(Debug, Clone)]
pub struct DiscoveryServer {
    state: Arc<XdsState>,
}

impl DiscoveryServer {
    pub fn new(state: Arc<XdsState>) -> Self {
        Self { state }
    }

    fn stream(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
        label: &'static str,
        type_url: Option<&'static str>,
    ) -> Response<SotwStream> {
        info!(stream = %label, remote_addr = ?request.remote_addr(), "New discovery stream connection established");
        let stream = run_stream_loop(self.state.clone(), request.into_inner(), label, type_url);
        Response::new(Box::pin(stream))
    }

    /// Unary fetch: the node's assigned snapshot, falling back to the latest one built.
    fn fetch(
        &self,
        request: Request<DiscoveryRequest>,
        type_url: &'static str,
    ) -> std::result::Result<Response<DiscoveryResponse>, Status> {
        let request = request.into_inner();
        self.state.registry.on_fetch_request(type_url);

        let node_id = request.node.as_ref().map(|node| node.id.as_str()).unwrap_or_default();
        let snapshot = self
            .state
            .snapshots
            .get_snapshot(node_id)
            .or_else(|| self.state.latest())
            .ok_or_else(|| Status::unavailable("no configuration snapshot has been built yet"))?;

        let response = build_response(&snapshot, type_url, &request.resource_names);
        debug!(
            type_url = type_label(type_url),
            node_id,
            version = %response.version_info,
            resource_count = response.resources.len(),
            "Answered fetch request"
        );
        Ok(Response::new(response))
    }

    fn delta(label: &str) -> std::result::Result<Response<DeltaStream>, Status> {
        debug!(stream = %label, "Refusing delta discovery stream");
        Err(Status::unimplemented("delta xDS is not supported, use state-of-the-world"))
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for DiscoveryServer {
    type StreamAggregatedResourcesStream = SotwStream;
    type DeltaAggregatedResourcesStream = DeltaStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        Ok(self.stream(request, "ADS", None))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Self::delta("ADS")
    }
}

#[tonic::async_trait]
impl ClusterDiscoveryService for DiscoveryServer {
    type StreamClustersStream = SotwStream;
    type DeltaClustersStream = DeltaStream;

    async fn stream_clusters(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamClustersStream>, Status> {
        Ok(self.stream(request, "CDS", Some(CLUSTER_TYPE_URL)))
    }

    async fn delta_clusters(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaClustersStream>, Status> {
        Self::delta("CDS")
    }

    async fn fetch_clusters(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> std::result::Result<Response<DiscoveryResponse>, Status> {
        self.fetch(request, CLUSTER_TYPE_URL)
    }
}

#[tonic::async_trait]
impl RouteDiscoveryService for DiscoveryServer {
    type StreamRoutesStream = SotwStream;
    type DeltaRoutesStream = DeltaStream;

    async fn stream_routes(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamRoutesStream>, Status> {
        Ok(self.stream(request, "RDS", Some(ROUTE_TYPE_URL)))
    }

    async fn delta_routes(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaRoutesStream>, Status> {
        Self::delta("RDS")
    }

    async fn fetch_routes(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> std::result::Result<Response<DiscoveryResponse>, Status> {
        self.fetch(request, ROUTE_TYPE_URL)
    }
}

#[tonic::async_trait]
impl ListenerDiscoveryService for DiscoveryServer {
    type StreamListenersStream = SotwStream;
    type DeltaListenersStream = DeltaStream;

    async fn stream_listeners(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamListenersStream>, Status> {
        Ok(self.stream(request, "LDS", Some(LISTENER_TYPE_URL)))
    }

    async fn delta_listeners(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaListenersStream>, Status> {
        Self::delta("LDS")
    }

    async fn fetch_listeners(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> std::result::Result<Response<DiscoveryResponse>, Status> {
        self.fetch(request, LISTENER_TYPE_URL)
    }
}

#[tonic::async_trait]
impl EndpointDiscoveryService for DiscoveryServer {
    type StreamEndpointsStream = SotwStream;
    type DeltaEndpointsStream = DeltaStream;

    async fn stream_endpoints(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamEndpointsStream>, Status> {
        Ok(self.stream(request, "EDS", Some(ENDPOINT_TYPE_URL)))
    }

    async fn delta_endpoints(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaEndpointsStream>, Status> {
        Self::delta("EDS")
    }

    async fn fetch_endpoints(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> std::result::Result<Response<DiscoveryResponse>, Status> {
        self.fetch(request, ENDPOINT_TYPE_URL)
    }
}
