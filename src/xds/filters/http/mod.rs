//! HTTP filter chain builders

pub mod cors;
pub mod ext_authz;
pub mod rate_limit;

use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::http_filter::ConfigType as HttpFilterConfigType;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::HttpFilter;
use envoy_types::pb::google::protobuf::Any as EnvoyAny;

use crate::config::EnvoyConfig;
use crate::xds::filters::any_from_message;

pub use cors::{CorsSettings, CORS_FILTER_NAME};
pub use ext_authz::EXT_AUTHZ_FILTER_NAME;
pub use rate_limit::RATE_LIMIT_FILTER_NAME;

/// Envoy's canonical router filter name
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";
const ROUTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";

fn http_filter(name: &str, config: EnvoyAny) -> HttpFilter {
    HttpFilter {
        name: name.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(config)),
        ..Default::default()
    }
}

/// Build the ordered HTTP filter list; the router is always last.
pub fn build_http_filters(envoy: &EnvoyConfig) -> Vec<HttpFilter> {
    let mut filters = Vec::with_capacity(4);

    if envoy.ext_authz.is_active() {
        filters.push(http_filter(EXT_AUTHZ_FILTER_NAME, ext_authz::ext_authz_filter(&envoy.ext_authz)));
    }

    filters.push(http_filter(CORS_FILTER_NAME, cors::cors_filter()));

    if envoy.rate_limiter.is_active() {
        filters.push(http_filter(
            RATE_LIMIT_FILTER_NAME,
            rate_limit::rate_limit_filter(&envoy.rate_limiter),
        ));
    }

    filters.push(http_filter(
        ROUTER_FILTER_NAME,
        any_from_message(ROUTER_TYPE_URL, &RouterFilter::default()),
    ));

    filters
}
