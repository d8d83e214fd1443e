//! xDS gRPC server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use crate::config::XdsTlsConfig;
use crate::xds::services::DiscoveryServer;
use crate::xds::state::XdsState;
use crate::{ControlPlaneError, Result};

/// Bind the configured xDS address and serve until `shutdown_signal` resolves.
pub async fn start_xds_server<F>(state: Arc<XdsState>, shutdown_signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr: SocketAddr = state
        .config
        .xds
        .bind_address()
        .parse()
        .map_err(|e| ControlPlaneError::config(format!("Invalid xDS address: {}", e)))?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ControlPlaneError::transport(format!(
                "XDS server failed to bind to {}: Port {} is already in use. Please use a different port or stop the existing service.",
                addr,
                addr.port()
            ))
        } else {
            ControlPlaneError::transport(format!("XDS server failed to bind to {}: {}", addr, e))
        }
    })?;

    serve_xds(state, listener, shutdown_signal).await
}

/// Serve CDS, RDS, LDS, EDS and ADS on an already bound listener.
pub async fn serve_xds<F>(state: Arc<XdsState>, listener: TcpListener, shutdown_signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let local_addr = listener.local_addr().map_err(|e| ControlPlaneError::io(e, "reading xDS listener address"))?;

    let mut builder = Server::builder();
    let tls = XdsTlsConfig::from_config(&state.config.xds)?;
    if let Some(tls) = &tls {
        builder = builder
            .tls_config(tls.load()?)
            .map_err(|e| ControlPlaneError::transport(format!("Invalid xDS TLS configuration: {}", e)))?;
    }

    let service = DiscoveryServer::new(state);
    let router = builder
        .add_service(AggregatedDiscoveryServiceServer::new(service.clone()))
        .add_service(ClusterDiscoveryServiceServer::new(service.clone()))
        .add_service(RouteDiscoveryServiceServer::new(service.clone()))
        .add_service(ListenerDiscoveryServiceServer::new(service.clone()))
        .add_service(EndpointDiscoveryServiceServer::new(service));

    info!(
        address = %local_addr,
        tls = tls.is_some(),
        mutual_tls = tls.as_ref().is_some_and(|tls| tls.client_ca_path.is_some()),
        "xDS server listening"
    );

    router
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal)
        .await
        .map_err(|e| ControlPlaneError::transport(format!("XDS server failed: {}", e)))?;

    info!("xDS server stopped");
    Ok(())
}
