//! Listener compiler
//!
//! One Envoy listener per TCP port. Every listener entity on that port becomes a filter
//! chain running an HTTP connection manager that fetches its routes over RDS from this
//! control plane. TLS chains are selected by SNI; a port carries at most one plaintext
//! chain because plaintext chains cannot be told apart.

use std::collections::BTreeMap;
use std::time::Duration;

use envoy_types::pb::envoy::config::accesslog::v3::{
    access_log_filter::FilterSpecifier, comparison_filter::Op, AccessLogFilter, AndFilter,
    ComparisonFilter, MetadataFilter, StatusCodeFilter,
};
use envoy_types::pb::envoy::config::core::v3::{
    Http2ProtocolOptions, HttpProtocolOptions, RuntimeUInt32,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, listener_filter::ConfigType as ListenerFilterConfigType,
    Filter, FilterChain, FilterChainMatch, Listener as EnvoyListener, ListenerFilter,
};
use envoy_types::pb::envoy::extensions::filters::listener::http_inspector::v3::HttpInspector;
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    HttpConnectionManager, LocalReplyConfig, Rds, ResponseMapper,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{
    metadata_matcher::{path_segment::Segment, PathSegment},
    value_matcher::MatchPattern,
    MetadataMatcher, ValueMatcher,
};
use envoy_types::pb::google::protobuf::{BoolValue, UInt32Value};
use tracing::{error, info, warn};

use crate::config::{EnvoyConfig, XdsConfig};
use crate::domain::listener::*;
use crate::domain::Listener;
use crate::xds::access_log::build_access_logs;
use crate::xds::filters::any_from_message;
use crate::xds::filters::http::{build_http_filters, EXT_AUTHZ_FILTER_NAME};
use crate::xds::helpers::{grpc_config_source, proto_duration, socket_address, uint32};
use crate::xds::tls::TlsSettings;

pub const HTTP_CONNECTION_MANAGER_NAME: &str = "envoy.filters.network.http_connection_manager";
pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
pub const HTTP_INSPECTOR_NAME: &str = "envoy.filters.listener.http_inspector";
pub const TLS_INSPECTOR_NAME: &str = "envoy.filters.listener.tls_inspector";
const HTTP_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.http_inspector.v3.HttpInspector";
const TLS_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";

pub const LISTEN_ADDRESS: &str = "0.0.0.0";
pub const STAT_PREFIX: &str = "ingress_http";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Metadata key the authorization server sets to turn a 429 into a 403
pub const RATE_LIMIT_TO_FORBIDDEN_KEY: &str = "rl429to403";

/// Name of the Envoy listener serving `port`.
pub fn listener_name(port: u32) -> String {
    format!("port_{port}")
}

/// Typed view of one listener entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub name: String,
    pub domains: Vec<String>,
    pub route_group: String,
    pub tls: Option<TlsSettings>,
    pub server_name: Option<String>,
    pub idle_timeout: Duration,
    pub max_concurrent_streams: u32,
    pub initial_connection_window_size: u32,
    pub initial_stream_window_size: u32,
}

impl ListenerSettings {
    pub fn from_entity(listener: &Listener) -> Self {
        let attributes = &listener.attributes;
        Self {
            name: listener.name.clone(),
            domains: listener.virtual_hosts.clone(),
            route_group: listener.route_group.clone(),
            tls: listener.has_tls_material().then(|| TlsSettings::from_attributes(attributes)),
            server_name: attributes.get_trimmed(ATTR_SERVER_NAME).map(str::to_string),
            idle_timeout: attributes.get_duration(ATTR_IDLE_TIMEOUT, DEFAULT_IDLE_TIMEOUT),
            max_concurrent_streams: attributes.get_u32(ATTR_MAX_CONCURRENT_STREAMS, 0),
            initial_connection_window_size: attributes.get_u32(ATTR_INITIAL_CONNECTION_WINDOW_SIZE, 0),
            initial_stream_window_size: attributes.get_u32(ATTR_INITIAL_STREAM_WINDOW_SIZE, 0),
        }
    }

    fn connection_manager(&self, listener: &Listener, envoy: &EnvoyConfig, xds: &XdsConfig) -> HttpConnectionManager {
        HttpConnectionManager {
            codec_type: CodecType::Auto as i32,
            stat_prefix: STAT_PREFIX.to_string(),
            use_remote_address: Some(BoolValue { value: true }),
            http_filters: build_http_filters(envoy),
            route_specifier: Some(RouteSpecifier::Rds(Rds {
                route_config_name: self.route_group.clone(),
                config_source: Some(grpc_config_source(&xds.cluster, xds.timeout())),
            })),
            access_log: build_access_logs(listener, &envoy.access_log),
            common_http_protocol_options: Some(HttpProtocolOptions {
                idle_timeout: Some(proto_duration(self.idle_timeout)),
                ..Default::default()
            }),
            http2_protocol_options: Some(Http2ProtocolOptions {
                max_concurrent_streams: uint32(self.max_concurrent_streams),
                initial_connection_window_size: uint32(self.initial_connection_window_size),
                initial_stream_window_size: uint32(self.initial_stream_window_size),
                ..Default::default()
            }),
            server_name: self.server_name.clone().unwrap_or_default(),
            local_reply_config: Some(LocalReplyConfig {
                mappers: vec![rate_limit_to_forbidden()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn filter_chain(&self, listener: &Listener, envoy: &EnvoyConfig, xds: &XdsConfig) -> FilterChain {
        let manager = self.connection_manager(listener, envoy, xds);
        let mut chain = FilterChain {
            name: self.name.clone(),
            filters: vec![Filter {
                name: HTTP_CONNECTION_MANAGER_NAME.to_string(),
                config_type: Some(FilterConfigType::TypedConfig(any_from_message(
                    HTTP_CONNECTION_MANAGER_TYPE_URL,
                    &manager,
                ))),
            }],
            ..Default::default()
        };

        if let Some(tls) = &self.tls {
            chain.filter_chain_match =
                Some(FilterChainMatch { server_names: self.domains.clone(), ..Default::default() });
            chain.transport_socket = Some(tls.downstream_transport_socket());
        }
        chain
    }
}

/// Local reply mapper rewriting 429 to 403 when ext_authz flagged the request.
fn rate_limit_to_forbidden() -> ResponseMapper {
    let status_is_429 = AccessLogFilter {
        filter_specifier: Some(FilterSpecifier::StatusCodeFilter(StatusCodeFilter {
            comparison: Some(ComparisonFilter {
                op: Op::Eq as i32,
                value: Some(RuntimeUInt32 {
                    default_value: 429,
                    runtime_key: RATE_LIMIT_TO_FORBIDDEN_KEY.to_string(),
                }),
            }),
        })),
    };
    let marker_present = AccessLogFilter {
        filter_specifier: Some(FilterSpecifier::MetadataFilter(MetadataFilter {
            matcher: Some(MetadataMatcher {
                filter: EXT_AUTHZ_FILTER_NAME.to_string(),
                path: vec![PathSegment { segment: Some(Segment::Key(RATE_LIMIT_TO_FORBIDDEN_KEY.to_string())) }],
                value: Some(ValueMatcher { match_pattern: Some(MatchPattern::PresentMatch(true)) }),
                ..Default::default()
            }),
            ..Default::default()
        })),
    };

    ResponseMapper {
        filter: Some(AccessLogFilter {
            filter_specifier: Some(FilterSpecifier::AndFilter(AndFilter {
                filters: vec![status_is_429, marker_present],
            })),
        }),
        status_code: Some(UInt32Value { value: 403 }),
        ..Default::default()
    }
}

fn listener_filter(name: &str, config: envoy_types::pb::google::protobuf::Any) -> ListenerFilter {
    ListenerFilter {
        name: name.to_string(),
        config_type: Some(ListenerFilterConfigType::TypedConfig(config)),
        ..Default::default()
    }
}

/// Build one Envoy listener per port, ordered by port.
pub fn build_listeners(listeners: &[Listener], envoy: &EnvoyConfig, xds: &XdsConfig) -> Vec<EnvoyListener> {
    let mut ports: BTreeMap<u32, Vec<&Listener>> = BTreeMap::new();
    for listener in listeners {
        match listener.listen_port() {
            Some(port) => ports.entry(port).or_default().push(listener),
            None => warn!(listener = %listener.name, port = listener.port, "Invalid listener port, skipping listener"),
        }
    }

    ports
        .into_iter()
        .map(|(port, mut members)| {
            members.sort_by(|a, b| a.name.cmp(&b.name));

            let mut filter_chains = Vec::with_capacity(members.len());
            let mut plaintext: Option<&str> = None;
            for listener in members {
                let settings = ListenerSettings::from_entity(listener);
                if settings.tls.is_none() {
                    if let Some(active) = plaintext {
                        error!(
                            port,
                            listener = %listener.name,
                            active = %active,
                            "Cannot add listener, already one plaintext listener active on port"
                        );
                        continue;
                    }
                    plaintext = Some(listener.name.as_str());
                }
                filter_chains.push(settings.filter_chain(listener, envoy, xds));
            }

            let mut listener_filters =
                vec![listener_filter(HTTP_INSPECTOR_NAME, any_from_message(HTTP_INSPECTOR_TYPE_URL, &HttpInspector::default()))];
            if filter_chains.iter().any(|chain| chain.transport_socket.is_some()) {
                listener_filters
                    .push(listener_filter(TLS_INSPECTOR_NAME, any_from_message(TLS_INSPECTOR_TYPE_URL, &TlsInspector::default())));
            }

            info!(port, filter_chains = filter_chains.len(), "Compiled listener");
            EnvoyListener {
                name: listener_name(port),
                address: Some(socket_address(LISTEN_ADDRESS, port)),
                filter_chains,
                listener_filters,
                ..Default::default()
            }
        })
        .collect()
}
