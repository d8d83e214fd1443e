//! Cluster compiler
//!
//! Attributes are parsed once into [`ClusterSettings`]; the Envoy `Cluster` is built from
//! the settings. A cluster without a usable upstream host and port is skipped with a warning.

use std::collections::HashMap;
use std::time::Duration;

use envoy_types::pb::envoy::config::cluster::v3::{
    circuit_breakers::Thresholds,
    cluster::{ClusterDiscoveryType, DiscoveryType, DnsLookupFamily, LbPolicy},
    CircuitBreakers, Cluster as EnvoyCluster, TrackClusterStats,
};
use envoy_types::pb::envoy::config::core::v3::{
    health_check::{HealthChecker, HttpHealthCheck},
    Address, HealthCheck, Http1ProtocolOptions, Http2ProtocolOptions,
    HttpProtocolOptions as CommonHttpProtocolOptions, TypedExtensionConfig,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint::HostIdentifier, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::extensions::network::dns_resolver::cares::v3::CaresDnsResolverConfig;
use envoy_types::pb::envoy::extensions::upstreams::http::v3::{
    http_protocol_options::{
        explicit_http_config::ProtocolConfig, ExplicitHttpConfig, UpstreamProtocolOptions,
    },
    HttpProtocolOptions,
};
use envoy_types::pb::envoy::r#type::v3::CodecClientType;
use tracing::warn;

use crate::domain::cluster::*;
use crate::domain::{Cluster, ATTR_HTTP_PROTOCOL, VALUE_HTTP_PROTOCOL_11, VALUE_HTTP_PROTOCOL_2, VALUE_HTTP_PROTOCOL_3};
use crate::xds::filters::any_from_message;
use crate::xds::helpers::{proto_duration, socket_address, split_list, uint32};
use crate::xds::tls::TlsSettings;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_DNS_REFRESH_RATE: Duration = Duration::from_secs(5);
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/";
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEALTH_CHECK_UNHEALTHY_THRESHOLD: u32 = 2;
pub const DEFAULT_HEALTH_CHECK_HEALTHY_THRESHOLD: u32 = 2;

const DNS_RESOLVER_PORT: u32 = 53;
const CARES_DNS_RESOLVER_NAME: &str = "envoy.network.dns_resolver.cares";
const CARES_DNS_RESOLVER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.network.dns_resolver.cares.v3.CaresDnsResolverConfig";
pub const HTTP_PROTOCOL_OPTIONS_KEY: &str = "envoy.extensions.upstreams.http.v3.HttpProtocolOptions";
const HTTP_PROTOCOL_OPTIONS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.upstreams.http.v3.HttpProtocolOptions";

/// Upstream HTTP protocol selected by `HTTPProtocol`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpProtocol {
    #[default]
    Http11,
    Http2,
    Http3,
}

impl HttpProtocol {
    fn parse(cluster: &str, value: Option<&str>) -> Self {
        match value {
            None => HttpProtocol::Http11,
            Some(VALUE_HTTP_PROTOCOL_11) => HttpProtocol::Http11,
            Some(VALUE_HTTP_PROTOCOL_2) => HttpProtocol::Http2,
            Some(VALUE_HTTP_PROTOCOL_3) => HttpProtocol::Http3,
            Some(other) => {
                warn!(cluster = %cluster, protocol = other, "Unknown HTTP protocol; using HTTP/1.1");
                HttpProtocol::Http11
            }
        }
    }

    fn codec(self) -> CodecClientType {
        match self {
            HttpProtocol::Http11 => CodecClientType::Http1,
            HttpProtocol::Http2 => CodecClientType::Http2,
            HttpProtocol::Http3 => CodecClientType::Http3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadBalancing {
    #[default]
    RoundRobin,
    LeastRequest,
    RingHash,
    Random,
    Maglev,
}

impl LoadBalancing {
    fn parse(cluster: &str, value: Option<&str>) -> Self {
        let Some(value) = value else {
            return LoadBalancing::RoundRobin;
        };
        match value.to_uppercase().as_str() {
            "ROUND_ROBIN" => LoadBalancing::RoundRobin,
            "LEAST_REQUEST" => LoadBalancing::LeastRequest,
            "RING_HASH" => LoadBalancing::RingHash,
            "RANDOM" => LoadBalancing::Random,
            "MAGLEV" => LoadBalancing::Maglev,
            other => {
                warn!(cluster = %cluster, policy = other, "Unknown lb policy; using round robin");
                LoadBalancing::RoundRobin
            }
        }
    }

    fn to_proto(self) -> i32 {
        let policy = match self {
            LoadBalancing::RoundRobin => LbPolicy::RoundRobin,
            LoadBalancing::LeastRequest => LbPolicy::LeastRequest,
            LoadBalancing::RingHash => LbPolicy::RingHash,
            LoadBalancing::Random => LbPolicy::Random,
            LoadBalancing::Maglev => LbPolicy::Maglev,
        };
        policy as i32
    }
}

fn dns_lookup_family(cluster: &str, value: Option<&str>) -> DnsLookupFamily {
    match value.map(str::to_uppercase).as_deref() {
        None | Some("AUTO") => DnsLookupFamily::Auto,
        Some("V4_ONLY") => DnsLookupFamily::V4Only,
        Some("V6_ONLY") => DnsLookupFamily::V6Only,
        Some(other) => {
            warn!(cluster = %cluster, family = other, "Unknown DNS lookup family; using AUTO");
            DnsLookupFamily::Auto
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSettings {
    pub path: String,
    pub host: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
    pub event_log_path: String,
    pub codec: HttpProtocol,
}

/// Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    pub max_connections: u32,
    pub max_pending_requests: u32,
    pub max_requests: u32,
    pub max_retries: u32,
}

/// Typed view of one cluster entity
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSettings {
    pub name: String,
    pub host: String,
    pub port: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub dns_refresh_rate: Duration,
    pub dns_lookup_family: DnsLookupFamily,
    pub dns_resolvers: Vec<String>,
    pub load_balancing: LoadBalancing,
    pub circuit_breakers: CircuitBreakerSettings,
    pub health_check: Option<HealthCheckSettings>,
    pub http_protocol: HttpProtocol,
    /// Present when TLS towards the upstream is enabled
    pub tls: Option<TlsSettings>,
    pub sni: String,
}

impl ClusterSettings {
    /// `None` when the cluster has no upstream host or port.
    pub fn from_entity(cluster: &Cluster) -> Option<Self> {
        let (Some(host), Some(port)) = (cluster.upstream_host(), cluster.upstream_port()) else {
            warn!(cluster = %cluster.name, "Cluster has no upstream host or port, skipping");
            return None;
        };
        let name = cluster.name.as_str();
        let attributes = &cluster.attributes;
        let http_protocol = HttpProtocol::parse(name, attributes.get_trimmed(ATTR_HTTP_PROTOCOL));

        let health_check = (attributes.get_trimmed(ATTR_HEALTH_CHECK_PROTOCOL)
            == Some(VALUE_HEALTH_CHECK_PROTOCOL_HTTP))
        .then(|| HealthCheckSettings {
            path: attributes.get_trimmed(ATTR_HEALTH_CHECK_PATH).unwrap_or(DEFAULT_HEALTH_CHECK_PATH).to_string(),
            host: attributes.get_trimmed(ATTR_HEALTH_CHECK_HOST_HEADER).unwrap_or_default().to_string(),
            interval: attributes.get_duration(ATTR_HEALTH_CHECK_INTERVAL, DEFAULT_HEALTH_CHECK_INTERVAL),
            timeout: attributes.get_duration(ATTR_HEALTH_CHECK_TIMEOUT, DEFAULT_HEALTH_CHECK_TIMEOUT),
            unhealthy_threshold: attributes
                .get_u32(ATTR_HEALTH_CHECK_UNHEALTHY_THRESHOLD, DEFAULT_HEALTH_CHECK_UNHEALTHY_THRESHOLD),
            healthy_threshold: attributes
                .get_u32(ATTR_HEALTH_CHECK_HEALTHY_THRESHOLD, DEFAULT_HEALTH_CHECK_HEALTHY_THRESHOLD),
            event_log_path: attributes.get_trimmed(ATTR_HEALTH_CHECK_LOG_FILE).unwrap_or_default().to_string(),
            codec: http_protocol,
        });

        let tls_settings = TlsSettings::from_attributes(attributes);
        let tls = (attributes.get_flag(ATTR_TLS) || tls_settings.has_parameters()).then_some(tls_settings);

        Some(Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            connect_timeout: attributes.get_duration(ATTR_CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT),
            idle_timeout: attributes.get_duration(ATTR_IDLE_TIMEOUT, DEFAULT_IDLE_TIMEOUT),
            dns_refresh_rate: attributes.get_duration(ATTR_DNS_REFRESH_RATE, DEFAULT_DNS_REFRESH_RATE),
            dns_lookup_family: dns_lookup_family(name, attributes.get_trimmed(ATTR_DNS_LOOKUP_FAMILY)),
            dns_resolvers: attributes.get(ATTR_DNS_RESOLVERS).map(split_list).unwrap_or_default(),
            load_balancing: LoadBalancing::parse(name, attributes.get_trimmed(ATTR_LB_POLICY)),
            circuit_breakers: CircuitBreakerSettings {
                max_connections: attributes.get_u32(ATTR_MAX_CONNECTIONS, 0),
                max_pending_requests: attributes.get_u32(ATTR_MAX_PENDING_REQUESTS, 0),
                max_requests: attributes.get_u32(ATTR_MAX_REQUESTS, 0),
                max_retries: attributes.get_u32(ATTR_MAX_RETRIES, 0),
            },
            health_check,
            http_protocol,
            tls,
            sni: attributes.get_trimmed(ATTR_SNI_HOST_NAME).unwrap_or(host).to_string(),
        })
    }

    pub fn build(&self) -> EnvoyCluster {
        EnvoyCluster {
            name: self.name.clone(),
            connect_timeout: Some(proto_duration(self.connect_timeout)),
            cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::LogicalDns as i32)),
            dns_lookup_family: self.dns_lookup_family as i32,
            dns_refresh_rate: Some(proto_duration(self.dns_refresh_rate)),
            typed_dns_resolver_config: self.dns_resolver_config(),
            lb_policy: self.load_balancing.to_proto(),
            load_assignment: Some(self.load_assignment()),
            circuit_breakers: Some(self.circuit_breakers()),
            health_checks: self.health_check.iter().map(HealthCheckSettings::to_proto).collect(),
            typed_extension_protocol_options: self.protocol_options(),
            transport_socket: self.tls.as_ref().map(|tls| tls.upstream_transport_socket(&self.sni)),
            track_cluster_stats: Some(TrackClusterStats {
                timeout_budgets: true,
                request_response_sizes: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn load_assignment(&self) -> ClusterLoadAssignment {
        ClusterLoadAssignment {
            cluster_name: self.name.clone(),
            endpoints: vec![LocalityLbEndpoints {
                lb_endpoints: vec![LbEndpoint {
                    host_identifier: Some(HostIdentifier::Endpoint(Endpoint {
                        address: Some(socket_address(&self.host, self.port)),
                        ..Default::default()
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn circuit_breakers(&self) -> CircuitBreakers {
        let limits = self.circuit_breakers;
        CircuitBreakers {
            thresholds: vec![Thresholds {
                max_connections: uint32(limits.max_connections),
                max_pending_requests: uint32(limits.max_pending_requests),
                max_requests: uint32(limits.max_requests),
                max_retries: uint32(limits.max_retries),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn dns_resolver_config(&self) -> Option<TypedExtensionConfig> {
        if self.dns_resolvers.is_empty() {
            return None;
        }
        let resolvers: Vec<Address> =
            self.dns_resolvers.iter().map(|resolver| socket_address(resolver, DNS_RESOLVER_PORT)).collect();
        let config = CaresDnsResolverConfig { resolvers, ..Default::default() };
        Some(TypedExtensionConfig {
            name: CARES_DNS_RESOLVER_NAME.to_string(),
            typed_config: Some(any_from_message(CARES_DNS_RESOLVER_TYPE_URL, &config)),
        })
    }

    /// Idle timeout plus the explicit upstream protocol.
    fn protocol_options(&self) -> HashMap<String, envoy_types::pb::google::protobuf::Any> {
        let protocol_config = match self.http_protocol {
            HttpProtocol::Http2 => ProtocolConfig::Http2ProtocolOptions(Http2ProtocolOptions::default()),
            HttpProtocol::Http11 | HttpProtocol::Http3 => {
                ProtocolConfig::HttpProtocolOptions(Http1ProtocolOptions::default())
            }
        };
        let options = HttpProtocolOptions {
            common_http_protocol_options: Some(CommonHttpProtocolOptions {
                idle_timeout: Some(proto_duration(self.idle_timeout)),
                ..Default::default()
            }),
            upstream_protocol_options: Some(UpstreamProtocolOptions::ExplicitHttpConfig(ExplicitHttpConfig {
                protocol_config: Some(protocol_config),
            })),
            ..Default::default()
        };

        HashMap::from([(
            HTTP_PROTOCOL_OPTIONS_KEY.to_string(),
            any_from_message(HTTP_PROTOCOL_OPTIONS_TYPE_URL, &options),
        )])
    }
}

impl HealthCheckSettings {
    fn to_proto(&self) -> HealthCheck {
        HealthCheck {
            timeout: Some(proto_duration(self.timeout)),
            interval: Some(proto_duration(self.interval)),
            unhealthy_threshold: uint32(self.unhealthy_threshold),
            healthy_threshold: uint32(self.healthy_threshold),
            event_log_path: self.event_log_path.clone(),
            health_checker: Some(HealthChecker::HttpHealthCheck(HttpHealthCheck {
                host: self.host.clone(),
                path: self.path.clone(),
                codec_client_type: self.codec.codec() as i32,
                ..Default::default()
            })),
            ..Default::default()
        }
    }
}

/// Compile every usable cluster, in input order.
pub fn build_clusters(clusters: &[Cluster]) -> Vec<EnvoyCluster> {
    clusters
        .iter()
        .filter_map(ClusterSettings::from_entity)
        .map(|settings| settings.build())
        .collect()
}
