//! Resource assembly
//!
//! Runs the three compilers over one consistent read of the entity lists and packs the
//! results as `Any` messages keyed by resource name.

use std::collections::HashSet;

use envoy_types::pb::envoy::config::cluster::v3::Cluster as EnvoyCluster;
use envoy_types::pb::envoy::config::listener::v3::Listener as EnvoyListener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::google::protobuf::Any;
use tracing::debug;

use crate::config::AppConfig;
use crate::storage::EntityLists;
use crate::xds::cluster::build_clusters;
use crate::xds::filters::any_from_message;
use crate::xds::listener::build_listeners;
use crate::xds::route::build_route_configurations;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

/// Type URLs served, in the order proxies should apply them
pub const SERVED_TYPE_URLS: [&str; 4] =
    [CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL];

/// Short label used in logs and metrics
pub fn type_label(type_url: &str) -> &'static str {
    match type_url {
        CLUSTER_TYPE_URL => "cds",
        ROUTE_TYPE_URL => "rds",
        LISTENER_TYPE_URL => "lds",
        ENDPOINT_TYPE_URL => "eds",
        _ => "unknown",
    }
}

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

/// Output of one compile, before it is versioned
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledResources {
    pub clusters: Vec<BuiltResource>,
    pub routes: Vec<BuiltResource>,
    pub listeners: Vec<BuiltResource>,
}

impl CompiledResources {
    /// Resources for a type URL; endpoints are always empty.
    pub fn by_type(&self, type_url: &str) -> &[BuiltResource] {
        match type_url {
            CLUSTER_TYPE_URL => &self.clusters,
            ROUTE_TYPE_URL => &self.routes,
            LISTENER_TYPE_URL => &self.listeners,
            _ => &[],
        }
    }
}

fn cluster_resource(cluster: EnvoyCluster) -> BuiltResource {
    BuiltResource { resource: any_from_message(CLUSTER_TYPE_URL, &cluster), name: cluster.name }
}

fn route_resource(route: RouteConfiguration) -> BuiltResource {
    BuiltResource { resource: any_from_message(ROUTE_TYPE_URL, &route), name: route.name }
}

fn listener_resource(listener: EnvoyListener) -> BuiltResource {
    BuiltResource { resource: any_from_message(LISTENER_TYPE_URL, &listener), name: listener.name }
}

/// Compile clusters, routes and listeners from one read of the entity lists.
///
/// Routes are resolved against the clusters that actually compiled, so a route never points
/// at a cluster missing from the same snapshot.
pub fn compile_resources(lists: &EntityLists, config: &AppConfig) -> CompiledResources {
    let clusters = build_clusters(&lists.clusters);
    let known_clusters: HashSet<&str> = clusters.iter().map(|cluster| cluster.name.as_str()).collect();

    let routes = build_route_configurations(&lists.routes, &lists.listeners, &known_clusters);
    let listeners = build_listeners(&lists.listeners, &config.envoy, &config.xds);

    debug!(
        clusters = clusters.len(),
        route_configurations = routes.len(),
        listeners = listeners.len(),
        "Compiled resources"
    );

    CompiledResources {
        routes: routes.into_iter().map(route_resource).collect(),
        listeners: listeners.into_iter().map(listener_resource).collect(),
        clusters: clusters.into_iter().map(cluster_resource).collect(),
    }
}
