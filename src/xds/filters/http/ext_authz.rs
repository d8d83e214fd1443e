//! External authorization (ext_authz) HTTP filter
//!
//! The listener-level filter calls the configured authorization cluster over gRPC. Routes
//! opt in: every route that does not ask for authorization carries a per-route override
//! disabling the filter.

use envoy_types::pb::envoy::config::core::v3::ApiVersion;
use envoy_types::pb::envoy::extensions::filters::http::ext_authz::v3::{
    ext_authz::Services, ext_authz_per_route::Override, BufferSettings,
    ExtAuthz as ExtAuthzProto, ExtAuthzPerRoute as ExtAuthzPerRouteProto,
};
use envoy_types::pb::google::protobuf::Any as EnvoyAny;

use crate::config::ExtAuthzConfig;
use crate::xds::filters::any_from_message;
use crate::xds::helpers::envoy_grpc_service;

pub const EXT_AUTHZ_FILTER_NAME: &str = "envoy.filters.http.ext_authz";
pub const EXT_AUTHZ_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.ext_authz.v3.ExtAuthz";
pub const EXT_AUTHZ_PER_ROUTE_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.ext_authz.v3.ExtAuthzPerRoute";

/// Build the listener-level ext_authz filter configuration.
pub fn ext_authz_filter(config: &ExtAuthzConfig) -> EnvoyAny {
    let with_request_body = (config.request_body_size > 0).then(|| BufferSettings {
        max_request_bytes: config.request_body_size,
        allow_partial_message: false,
        ..Default::default()
    });

    let proto = ExtAuthzProto {
        services: Some(Services::GrpcService(envoy_grpc_service(&config.cluster, config.timeout()))),
        transport_api_version: ApiVersion::V3 as i32,
        failure_mode_allow: config.failure_mode_allow,
        with_request_body,
        ..Default::default()
    };

    any_from_message(EXT_AUTHZ_TYPE_URL, &proto)
}

/// Per-route override switching the ext_authz filter off.
pub fn ext_authz_disabled() -> EnvoyAny {
    let proto = ExtAuthzPerRouteProto { r#override: Some(Override::Disabled(true)) };
    any_from_message(EXT_AUTHZ_PER_ROUTE_TYPE_URL, &proto)
}
