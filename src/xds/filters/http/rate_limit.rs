//! Global rate limit HTTP filter and the route actions feeding it

use envoy_types::pb::envoy::config::core::v3::ApiVersion;
use envoy_types::pb::envoy::config::ratelimit::v3::RateLimitServiceConfig;
use envoy_types::pb::envoy::config::route::v3::rate_limit::{action::ActionSpecifier, Action};
use envoy_types::pb::envoy::config::route::v3::RateLimit as RouteRateLimit;
use envoy_types::pb::envoy::extensions::filters::http::ratelimit::v3::RateLimit as RateLimitProto;
use envoy_types::pb::google::protobuf::Any as EnvoyAny;

use crate::config::RateLimiterConfig;
use crate::xds::filters::any_from_message;
use crate::xds::helpers::{envoy_grpc_service, proto_duration};

pub const RATE_LIMIT_FILTER_NAME: &str = "envoy.filters.http.ratelimit";
pub const RATE_LIMIT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.ratelimit.v3.RateLimit";

/// Build the listener-level rate limit filter configuration.
pub fn rate_limit_filter(config: &RateLimiterConfig) -> EnvoyAny {
    let proto = RateLimitProto {
        domain: config.domain.clone(),
        stage: 0,
        failure_mode_deny: !config.failure_mode_allow,
        timeout: Some(proto_duration(config.timeout())),
        rate_limit_service: Some(RateLimitServiceConfig {
            grpc_service: Some(envoy_grpc_service(&config.cluster, config.timeout())),
            transport_api_version: ApiVersion::V3 as i32,
        }),
        ..Default::default()
    };

    any_from_message(RATE_LIMIT_TYPE_URL, &proto)
}

/// Route rate limit descriptor keyed on the downstream remote address.
pub fn remote_address_rate_limit() -> RouteRateLimit {
    RouteRateLimit {
        actions: vec![Action {
            action_specifier: Some(ActionSpecifier::RemoteAddress(Default::default())),
        }],
        ..Default::default()
    }
}
