//! Route compiler
//!
//! Routes are grouped by route group; each group becomes one `RouteConfiguration` holding a
//! single virtual host. Within a route the action is a [`Destination`] chosen by fixed
//! precedence: direct response, redirect, cluster, weighted clusters.
//!
//! Authorization is opt-in per route: unless `Authenticate=true` (or the older
//! `ExtAuthz=true`) is set, the route disables the ext_authz filter through its
//! per-filter config.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use base64::Engine;
use envoy_types::pb::envoy::config::core::v3::{
    data_source::Specifier, header_value_option::HeaderAppendAction, DataSource, HeaderValue,
    HeaderValueOption, RuntimeFractionalPercent,
};
use envoy_types::pb::envoy::config::route::v3::{
    redirect_action::{PathRewriteSpecifier, RedirectResponseCode, SchemeRewriteSpecifier},
    retry_policy::RetryHostPredicate,
    route::Action,
    route_action::{ClusterSpecifier, HostRewriteSpecifier, RequestMirrorPolicy},
    route_match::PathSpecifier,
    weighted_cluster::ClusterWeight,
    DirectResponseAction, RedirectAction, RetryPolicy, Route as EnvoyRoute, RouteAction,
    RouteConfiguration, RouteMatch, VirtualHost, WeightedCluster,
};
use envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher;
use envoy_types::pb::envoy::r#type::v3::{fractional_percent::DenominatorType, FractionalPercent};
use envoy_types::pb::google::protobuf::{Any, UInt32Value};
use tracing::warn;

use crate::domain::route::*;
use crate::domain::{Listener, PathType};
use crate::xds::filters::http::ext_authz::ext_authz_disabled;
use crate::xds::filters::http::rate_limit::remote_address_rate_limit;
use crate::xds::filters::http::{CorsSettings, CORS_FILTER_NAME, EXT_AUTHZ_FILTER_NAME};
use crate::xds::helpers::{proto_duration, split_list};

pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_PER_TRY_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_NUM_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_STATUS_CODES: &str = "500,503,504";
pub const PREVIOUS_HOSTS_PREDICATE: &str = "envoy.retry_host_predicates.previous_hosts";
pub const WILDCARD_DOMAIN: &str = "*";

const AUTHORIZATION_HEADER: &str = "Authorization";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

impl PathMatch {
    fn to_proto(&self) -> RouteMatch {
        let path_specifier = match self {
            PathMatch::Exact(path) => PathSpecifier::Path(path.clone()),
            PathMatch::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
            PathMatch::Regex(regex) => {
                PathSpecifier::SafeRegex(RegexMatcher { regex: regex.clone(), ..Default::default() })
            }
        };
        RouteMatch { path_specifier: Some(path_specifier), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSettings {
    pub status_code: u32,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: u32,
    pub path: Option<String>,
    pub strip_query: bool,
}

impl RedirectSettings {
    fn response_code(status: u32) -> Option<RedirectResponseCode> {
        match status {
            301 => Some(RedirectResponseCode::MovedPermanently),
            302 => Some(RedirectResponseCode::Found),
            303 => Some(RedirectResponseCode::SeeOther),
            307 => Some(RedirectResponseCode::TemporaryRedirect),
            308 => Some(RedirectResponseCode::PermanentRedirect),
            _ => None,
        }
    }

    fn to_proto(&self) -> RedirectAction {
        RedirectAction {
            response_code: Self::response_code(self.status_code)
                .unwrap_or(RedirectResponseCode::MovedPermanently) as i32,
            scheme_rewrite_specifier: self.scheme.clone().map(SchemeRewriteSpecifier::SchemeRedirect),
            host_redirect: self.host.clone().unwrap_or_default(),
            port_redirect: self.port,
            path_rewrite_specifier: self.path.clone().map(PathRewriteSpecifier::PathRedirect),
            strip_query: self.strip_query,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterShare {
    pub name: String,
    pub weight: u32,
}

/// What a route does with a matched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    DirectResponse { status: u32, body: Option<String> },
    Redirect(RedirectSettings),
    Cluster(String),
    WeightedClusters(Vec<ClusterShare>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub retry_on: String,
    pub num_retries: u32,
    pub per_try_timeout: Duration,
    pub status_codes: Vec<u32>,
}

impl RetrySettings {
    fn to_proto(&self) -> RetryPolicy {
        RetryPolicy {
            retry_on: self.retry_on.clone(),
            num_retries: Some(UInt32Value { value: self.num_retries }),
            per_try_timeout: Some(proto_duration(self.per_try_timeout)),
            retriable_status_codes: self.status_codes.clone(),
            retry_host_predicate: vec![RetryHostPredicate {
                name: PREVIOUS_HOSTS_PREDICATE.to_string(),
                config_type: None,
            }],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    pub cluster: String,
    pub percentage: u32,
}

/// Typed view of one route entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSettings {
    pub name: String,
    pub path: PathMatch,
    pub destination: Destination,
    pub prefix_rewrite: Option<String>,
    pub host_rewrite: Option<String>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetrySettings>,
    pub cors: Option<CorsSettings>,
    pub mirror: Option<MirrorSettings>,
    pub headers_to_add: Vec<(String, String)>,
    pub headers_to_remove: Vec<String>,
    pub authenticate: bool,
    pub rate_limiting: bool,
}

impl RouteSettings {
    /// Parse a route, resolving cluster references against `known_clusters`.
    ///
    /// Returns `None` and logs a warning when the route has an unknown path type, an
    /// invalid regex, or no usable destination.
    pub fn from_entity(route: &Route, known_clusters: &HashSet<&str>) -> Option<Self> {
        let name = route.name.as_str();
        let attributes = &route.attributes;

        let path = match route.parsed_path_type() {
            Some(PathType::Exact) => PathMatch::Exact(route.path.clone()),
            Some(PathType::Prefix) => PathMatch::Prefix(route.path.clone()),
            Some(PathType::Regex) => {
                if let Err(e) = regex::Regex::new(&route.path) {
                    warn!(route = %name, path = %route.path, error = %e, "Invalid path regex, skipping route");
                    return None;
                }
                PathMatch::Regex(route.path.clone())
            }
            None => {
                warn!(route = %name, path_type = %route.path_type, "Unknown path type, skipping route");
                return None;
            }
        };

        let Some(destination) = destination(route, known_clusters) else {
            warn!(route = %name, "Route has no usable destination, skipping route");
            return None;
        };

        let authenticate = attributes.get_flag(ATTR_AUTHENTICATE) || attributes.get_flag(ATTR_EXT_AUTHZ);
        let mut headers_to_remove = Vec::new();
        if authenticate {
            headers_to_remove.push(AUTHORIZATION_HEADER.to_string());
        }
        headers_to_remove.extend(attributes.get(ATTR_REQUEST_HEADERS_TO_REMOVE).map(split_list).unwrap_or_default());

        Some(Self {
            name: name.to_string(),
            path,
            destination,
            prefix_rewrite: attributes.get_trimmed(ATTR_PREFIX_REWRITE).map(str::to_string),
            host_rewrite: attributes.get_trimmed(ATTR_HOST_HEADER).map(str::to_string),
            timeout: attributes
                .contains(ATTR_TIMEOUT)
                .then(|| attributes.get_duration(ATTR_TIMEOUT, DEFAULT_ROUTE_TIMEOUT)),
            retry: retry_settings(route),
            cors: CorsSettings::from_attributes(attributes),
            mirror: mirror_settings(route, known_clusters),
            headers_to_add: headers_to_add(route),
            headers_to_remove,
            authenticate,
            rate_limiting: attributes.get_flag(ATTR_RATE_LIMITING),
        })
    }

    pub fn build(&self) -> EnvoyRoute {
        let action = match &self.destination {
            Destination::DirectResponse { status, body } => Action::DirectResponse(DirectResponseAction {
                status: *status,
                body: body.as_ref().map(|body| DataSource {
                    specifier: Some(Specifier::InlineString(body.clone())),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            Destination::Redirect(redirect) => Action::Redirect(redirect.to_proto()),
            Destination::Cluster(cluster) => {
                Action::Route(self.route_action(ClusterSpecifier::Cluster(cluster.clone())))
            }
            Destination::WeightedClusters(shares) => {
                Action::Route(self.route_action(ClusterSpecifier::WeightedClusters(weighted_clusters(shares))))
            }
        };

        let mut typed_per_filter_config: HashMap<String, Any> = HashMap::new();
        if !self.authenticate {
            typed_per_filter_config.insert(EXT_AUTHZ_FILTER_NAME.to_string(), ext_authz_disabled());
        }
        if let Some(cors) = &self.cors {
            typed_per_filter_config.insert(CORS_FILTER_NAME.to_string(), cors.to_any());
        }

        EnvoyRoute {
            name: self.name.clone(),
            r#match: Some(self.path.to_proto()),
            action: Some(action),
            typed_per_filter_config,
            request_headers_to_add: self
                .headers_to_add
                .iter()
                .map(|(key, value)| HeaderValueOption {
                    header: Some(HeaderValue { key: key.clone(), value: value.clone(), ..Default::default() }),
                    append_action: HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
                    ..Default::default()
                })
                .collect(),
            request_headers_to_remove: self.headers_to_remove.clone(),
            ..Default::default()
        }
    }

    fn route_action(&self, cluster_specifier: ClusterSpecifier) -> RouteAction {
        RouteAction {
            cluster_specifier: Some(cluster_specifier),
            prefix_rewrite: self.prefix_rewrite.clone().unwrap_or_default(),
            host_rewrite_specifier: self.host_rewrite.clone().map(HostRewriteSpecifier::HostRewriteLiteral),
            timeout: self.timeout.map(proto_duration),
            retry_policy: self.retry.as_ref().map(RetrySettings::to_proto),
            request_mirror_policies: self
                .mirror
                .iter()
                .map(|mirror| RequestMirrorPolicy {
                    cluster: mirror.cluster.clone(),
                    runtime_fraction: Some(RuntimeFractionalPercent {
                        default_value: Some(FractionalPercent {
                            numerator: mirror.percentage,
                            denominator: DenominatorType::Hundred as i32,
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .collect(),
            rate_limits: if self.rate_limiting { vec![remote_address_rate_limit()] } else { Vec::new() },
            ..Default::default()
        }
    }
}

#[allow(deprecated)]
fn weighted_clusters(shares: &[ClusterShare]) -> WeightedCluster {
    WeightedCluster {
        clusters: shares
            .iter()
            .map(|share| ClusterWeight {
                name: share.name.clone(),
                weight: Some(UInt32Value { value: share.weight }),
                ..Default::default()
            })
            .collect(),
        total_weight: Some(UInt32Value { value: total_weight(shares).unwrap_or(u32::MAX) }),
        ..Default::default()
    }
}

/// Sum of the share weights; `None` when it does not fit a protobuf `uint32`.
fn total_weight(shares: &[ClusterShare]) -> Option<u32> {
    shares.iter().try_fold(0u32, |total, share| total.checked_add(share.weight))
}

fn destination(route: &Route, known_clusters: &HashSet<&str>) -> Option<Destination> {
    let name = route.name.as_str();
    let attributes = &route.attributes;

    if let Some(status) = attributes.get_trimmed(ATTR_DIRECT_RESPONSE_STATUS_CODE) {
        match status.parse::<u32>().ok().filter(|code| (100..600).contains(code)) {
            Some(status) => {
                return Some(Destination::DirectResponse {
                    status,
                    body: attributes.get(ATTR_DIRECT_RESPONSE_BODY).map(str::to_string),
                });
            }
            None => warn!(route = %name, status, "Invalid direct response status code, ignoring"),
        }
    }

    if let Some(status) = attributes.get_trimmed(ATTR_REDIRECT_STATUS_CODE) {
        match status.parse::<u32>().ok().filter(|code| RedirectSettings::response_code(*code).is_some()) {
            Some(status_code) => {
                return Some(Destination::Redirect(RedirectSettings {
                    status_code,
                    scheme: attributes.get_trimmed(ATTR_REDIRECT_SCHEME).map(str::to_string),
                    host: attributes.get_trimmed(ATTR_REDIRECT_HOST_NAME).map(str::to_string),
                    port: attributes.get_u32(ATTR_REDIRECT_PORT, 0),
                    path: attributes.get_trimmed(ATTR_REDIRECT_PATH).map(str::to_string),
                    strip_query: attributes.get_flag(ATTR_REDIRECT_STRIP_QUERY),
                }));
            }
            None => warn!(route = %name, status, "Invalid redirect status code, ignoring"),
        }
    }

    if let Some(cluster) = attributes.get_trimmed(ATTR_CLUSTER) {
        if known_clusters.contains(cluster) {
            return Some(Destination::Cluster(cluster.to_string()));
        }
        warn!(route = %name, cluster, "Route references unknown cluster");
        return None;
    }

    if let Some(value) = attributes.get(ATTR_WEIGHTED_CLUSTERS) {
        let shares: Vec<ClusterShare> = parse_weighted_clusters(value)
            .into_iter()
            .filter(|share| {
                let known = known_clusters.contains(share.name.as_str());
                if !known {
                    warn!(route = %name, cluster = %share.name, "Weighted cluster entry references unknown cluster");
                }
                known
            })
            .collect();
        if shares.is_empty() {
            return None;
        }
        if total_weight(&shares).is_none() {
            warn!(route = %name, value, "Weighted cluster total exceeds the maximum weight, ignoring weighted clusters");
            return None;
        }
        return Some(Destination::WeightedClusters(shares));
    }

    None
}

/// Parse `name:weight,name:weight`. A missing or malformed weight, or zero, counts as 1.
pub fn parse_weighted_clusters(value: &str) -> Vec<ClusterShare> {
    split_list(value)
        .into_iter()
        .filter_map(|entry| {
            let (name, weight) = match entry.split_once(':') {
                Some((name, weight)) => (name.trim(), weight.trim().parse::<u32>().ok()),
                None => (entry.as_str(), None),
            };
            (!name.is_empty()).then(|| ClusterShare {
                name: name.to_string(),
                weight: weight.filter(|weight| *weight > 0).unwrap_or(1),
            })
        })
        .collect()
}

/// Comma separated status codes; entries that are not integers are skipped.
pub fn parse_status_codes(value: &str) -> Vec<u32> {
    split_list(value).iter().filter_map(|code| code.parse::<u32>().ok()).collect()
}

fn retry_settings(route: &Route) -> Option<RetrySettings> {
    let attributes = &route.attributes;
    let retry_on = attributes.get_trimmed(ATTR_RETRY_ON)?;
    Some(RetrySettings {
        retry_on: retry_on.to_string(),
        num_retries: attributes.get_u32(ATTR_NUM_RETRIES, DEFAULT_NUM_RETRIES),
        per_try_timeout: attributes.get_duration(ATTR_PER_TRY_TIMEOUT, DEFAULT_PER_TRY_TIMEOUT),
        status_codes: parse_status_codes(
            attributes.get(ATTR_RETRY_ON_STATUS_CODES).unwrap_or(DEFAULT_RETRY_STATUS_CODES),
        ),
    })
}

fn mirror_settings(route: &Route, known_clusters: &HashSet<&str>) -> Option<MirrorSettings> {
    let attributes = &route.attributes;
    let cluster = attributes.get_trimmed(ATTR_REQUEST_MIRROR_CLUSTER)?;
    let percentage = attributes.get_trimmed(ATTR_REQUEST_MIRROR_PERCENTAGE)?;

    let Some(percentage) = percentage.parse::<u32>().ok().filter(|value| *value <= 100) else {
        warn!(route = %route.name, percentage, "Mirror percentage must be between 0 and 100, ignoring mirror");
        return None;
    };
    if !known_clusters.contains(cluster) {
        warn!(route = %route.name, cluster, "Mirror references unknown cluster, ignoring mirror");
        return None;
    }
    Some(MirrorSettings { cluster: cluster.to_string(), percentage })
}

fn headers_to_add(route: &Route) -> Vec<(String, String)> {
    let attributes = &route.attributes;
    let mut headers = Vec::new();

    if let Some(credentials) = attributes.get_trimmed(ATTR_BASIC_AUTH) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        headers.push((AUTHORIZATION_HEADER.to_string(), format!("Basic {encoded}")));
    }

    for slot in ATTR_REQUEST_HEADERS_TO_ADD {
        let Some(value) = attributes.get(slot) else {
            continue;
        };
        match value.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
            _ => warn!(route = %route.name, attribute = slot, "Header to add must be name=value, ignoring"),
        }
    }
    headers
}

/// One `RouteConfiguration` per route group, ordered by group name.
///
/// The virtual host domains are the domains of every listener routing through the group,
/// or `*` when no listener references it.
pub fn build_route_configurations(
    routes: &[Route],
    listeners: &[Listener],
    known_clusters: &HashSet<&str>,
) -> Vec<RouteConfiguration> {
    let mut groups: BTreeMap<&str, Vec<EnvoyRoute>> = BTreeMap::new();
    for route in routes {
        let compiled = RouteSettings::from_entity(route, known_clusters).map(|settings| settings.build());
        let entry = groups.entry(route.route_group.as_str()).or_default();
        entry.extend(compiled);
    }

    groups
        .into_iter()
        .map(|(group, routes)| {
            let mut domains: Vec<String> = listeners
                .iter()
                .filter(|listener| listener.route_group == group)
                .flat_map(|listener| listener.virtual_hosts.iter().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if domains.is_empty() {
                domains.push(WILDCARD_DOMAIN.to_string());
            }

            RouteConfiguration {
                name: group.to_string(),
                virtual_hosts: vec![VirtualHost {
                    name: group.to_string(),
                    domains,
                    routes,
                    ..Default::default()
                }],
                ..Default::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attributes;
    use crate::xds::filters::http::ext_authz::EXT_AUTHZ_PER_ROUTE_TYPE_URL;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn known() -> HashSet<&'static str> {
        HashSet::from(["upstream", "upstream1", "upstream2", "second_cluster"])
    }

    fn route(path_type: &str, path: &str, attributes: &[(&str, &str)]) -> Route {
        Route::new("default", "default", path_type, path)
            .with_attributes(attributes.iter().copied().collect::<Attributes>())
    }

    fn settings(attributes: &[(&str, &str)]) -> RouteSettings {
        RouteSettings::from_entity(&route("prefix", "/", attributes), &known()).expect("route compiles")
    }

    fn route_action(built: &EnvoyRoute) -> &RouteAction {
        match built.action.as_ref() {
            Some(Action::Route(action)) => action,
            other => panic!("expected route action, got {other:?}"),
        }
    }

    #[test]
    fn test_cluster_route_with_rewrites_and_timeout() {
        let built = settings(&[
            (ATTR_CLUSTER, "upstream"),
            (ATTR_PREFIX_REWRITE, "/seconddefault"),
            (ATTR_HOST_HEADER, "www.example.com"),
            (ATTR_TIMEOUT, "2s"),
        ])
        .build();

        assert_eq!(built.name, "default");
        assert_eq!(built.r#match.as_ref().unwrap().path_specifier, Some(PathSpecifier::Prefix("/".into())));
        let action = route_action(&built);
        assert_eq!(action.cluster_specifier, Some(ClusterSpecifier::Cluster("upstream".into())));
        assert_eq!(action.prefix_rewrite, "/seconddefault");
        assert_eq!(
            action.host_rewrite_specifier,
            Some(HostRewriteSpecifier::HostRewriteLiteral("www.example.com".into()))
        );
        assert_eq!(action.timeout, Some(proto_duration(Duration::from_secs(2))));
    }

    #[test]
    fn test_timeout_only_when_present() {
        let built = settings(&[(ATTR_CLUSTER, "upstream")]).build();
        assert_eq!(route_action(&built).timeout, None);

        let malformed = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_TIMEOUT, "later")]).build();
        assert_eq!(route_action(&malformed).timeout, Some(proto_duration(DEFAULT_ROUTE_TIMEOUT)));
    }

    #[test]
    fn test_authorization_disabled_unless_opted_in() {
        let default = settings(&[(ATTR_CLUSTER, "upstream")]).build();
        let override_config = default.typed_per_filter_config.get(EXT_AUTHZ_FILTER_NAME).unwrap();
        assert_eq!(override_config.type_url, EXT_AUTHZ_PER_ROUTE_TYPE_URL);
        assert_eq!(override_config, &ext_authz_disabled());

        let explicit_false = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_AUTHENTICATE, "false")]).build();
        assert!(explicit_false.typed_per_filter_config.contains_key(EXT_AUTHZ_FILTER_NAME));

        let opted_in = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_AUTHENTICATE, "true")]).build();
        assert!(!opted_in.typed_per_filter_config.contains_key(EXT_AUTHZ_FILTER_NAME));

        let legacy = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_EXT_AUTHZ, "true")]).build();
        assert!(!legacy.typed_per_filter_config.contains_key(EXT_AUTHZ_FILTER_NAME));
    }

    #[test]
    fn test_action_precedence() {
        let direct = settings(&[
            (ATTR_DIRECT_RESPONSE_STATUS_CODE, "200"),
            (ATTR_DIRECT_RESPONSE_BODY, "Hello World"),
            (ATTR_REDIRECT_STATUS_CODE, "301"),
            (ATTR_CLUSTER, "upstream"),
        ]);
        assert_eq!(
            direct.destination,
            Destination::DirectResponse { status: 200, body: Some("Hello World".into()) }
        );

        let redirect = settings(&[(ATTR_REDIRECT_STATUS_CODE, "301"), (ATTR_CLUSTER, "upstream")]);
        assert!(matches!(redirect.destination, Destination::Redirect(_)));

        let cluster = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_WEIGHTED_CLUSTERS, "upstream1:1")]);
        assert_eq!(cluster.destination, Destination::Cluster("upstream".into()));
    }

    #[test]
    fn test_direct_response_status_range() {
        let built = settings(&[(ATTR_DIRECT_RESPONSE_STATUS_CODE, "255"), (ATTR_DIRECT_RESPONSE_BODY, "Hi")]).build();
        let Some(Action::DirectResponse(direct)) = built.action else {
            panic!("expected direct response");
        };
        assert_eq!(direct.status, 255);
        assert_eq!(direct.body.and_then(|body| body.specifier), Some(Specifier::InlineString("Hi".into())));

        let invalid = settings(&[(ATTR_DIRECT_RESPONSE_STATUS_CODE, "999"), (ATTR_CLUSTER, "upstream")]);
        assert_eq!(invalid.destination, Destination::Cluster("upstream".into()));
    }

    #[test]
    fn test_redirect_fields() {
        let built = settings(&[
            (ATTR_REDIRECT_STATUS_CODE, "308"),
            (ATTR_REDIRECT_SCHEME, "https"),
            (ATTR_REDIRECT_HOST_NAME, "www.example.com"),
            (ATTR_REDIRECT_PORT, "8443"),
            (ATTR_REDIRECT_PATH, "/newlocation"),
            (ATTR_REDIRECT_STRIP_QUERY, "true"),
        ])
        .build();
        let Some(Action::Redirect(redirect)) = built.action else {
            panic!("expected redirect");
        };
        assert_eq!(redirect.response_code, RedirectResponseCode::PermanentRedirect as i32);
        assert_eq!(redirect.scheme_rewrite_specifier, Some(SchemeRewriteSpecifier::SchemeRedirect("https".into())));
        assert_eq!(redirect.host_redirect, "www.example.com");
        assert_eq!(redirect.port_redirect, 8443);
        assert_eq!(redirect.path_rewrite_specifier, Some(PathRewriteSpecifier::PathRedirect("/newlocation".into())));
        assert!(redirect.strip_query);
    }

    #[test]
    fn test_empty_redirect_status_is_no_redirect() {
        let settings = RouteSettings::from_entity(&route("prefix", "/", &[(ATTR_REDIRECT_STATUS_CODE, "")]), &known());
        assert!(settings.is_none());
    }

    #[test]
    #[allow(deprecated)]
    fn test_weighted_clusters_route() {
        let built = settings(&[(ATTR_WEIGHTED_CLUSTERS, "upstream1:10,upstream2:25")]).build();
        let Some(ClusterSpecifier::WeightedClusters(weighted)) = route_action(&built).cluster_specifier.clone()
        else {
            panic!("expected weighted clusters");
        };
        assert_eq!(weighted.clusters.len(), 2);
        assert_eq!(weighted.clusters[1].weight, Some(UInt32Value { value: 25 }));
        assert_eq!(weighted.total_weight, Some(UInt32Value { value: 35 }));
    }

    #[test]
    #[traced_test]
    fn test_weighted_total_overflow_skips_route() {
        let overflowing = route("prefix", "/", &[(ATTR_WEIGHTED_CLUSTERS, "upstream1:4000000000,upstream2:4000000000")]);
        assert!(RouteSettings::from_entity(&overflowing, &known()).is_none());
        assert!(logs_contain("exceeds the maximum weight"));

        let at_limit = settings(&[(ATTR_WEIGHTED_CLUSTERS, "upstream1:4294967294,upstream2:1")]);
        let Destination::WeightedClusters(shares) = &at_limit.destination else {
            panic!("expected weighted clusters");
        };
        assert_eq!(total_weight(shares), Some(u32::MAX));
    }

    #[test]
    fn test_parse_weighted_clusters_defaults_missing_weight() {
        let parsed = parse_weighted_clusters("a:3,b:7");
        assert_eq!(parsed, vec![
            ClusterShare { name: "a".into(), weight: 3 },
            ClusterShare { name: "b".into(), weight: 7 },
        ]);

        let defaults: Vec<u32> = parse_weighted_clusters("a,b").iter().map(|share| share.weight).collect();
        assert_eq!(defaults, vec![1, 1]);

        let mixed: Vec<u32> =
            parse_weighted_clusters("cluster1,cluster2:50,cluster3:x").iter().map(|share| share.weight).collect();
        assert_eq!(mixed, vec![1, 50, 1]);
    }

    #[test]
    #[traced_test]
    fn test_unknown_clusters_are_skipped() {
        let dangling = RouteSettings::from_entity(&route("prefix", "/", &[(ATTR_CLUSTER, "ghost")]), &known());
        assert!(dangling.is_none());
        assert!(logs_contain("unknown cluster"));

        let partial = settings(&[(ATTR_WEIGHTED_CLUSTERS, "upstream1:5,ghost:5")]);
        assert_eq!(
            partial.destination,
            Destination::WeightedClusters(vec![ClusterShare { name: "upstream1".into(), weight: 5 }])
        );

        let none_left = RouteSettings::from_entity(&route("prefix", "/", &[(ATTR_WEIGHTED_CLUSTERS, "ghost:1")]), &known());
        assert!(none_left.is_none());
    }

    #[test]
    #[traced_test]
    fn test_path_types() {
        let exact = RouteSettings::from_entity(&route("path", "/dsr", &[(ATTR_CLUSTER, "upstream")]), &known()).unwrap();
        assert_eq!(exact.path, PathMatch::Exact("/dsr".into()));

        let regex = RouteSettings::from_entity(&route("regexp", "^/v[0-9]+/", &[(ATTR_CLUSTER, "upstream")]), &known())
            .unwrap()
            .build();
        assert!(matches!(regex.r#match.unwrap().path_specifier, Some(PathSpecifier::SafeRegex(_))));

        assert!(RouteSettings::from_entity(&route("glob", "/*", &[(ATTR_CLUSTER, "upstream")]), &known()).is_none());
        assert!(logs_contain("Unknown path type"));

        assert!(RouteSettings::from_entity(&route("regex", "/(unclosed", &[(ATTR_CLUSTER, "upstream")]), &known())
            .is_none());
        assert!(logs_contain("Invalid path regex"));
    }

    #[test]
    fn test_retry_policy() {
        assert!(settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_RETRY_ON, " ")]).retry.is_none());

        let defaults = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_RETRY_ON, "5xx")]).retry.unwrap().to_proto();
        assert_eq!(defaults.num_retries, Some(UInt32Value { value: DEFAULT_NUM_RETRIES }));
        assert_eq!(defaults.per_try_timeout, Some(proto_duration(DEFAULT_PER_TRY_TIMEOUT)));
        assert_eq!(defaults.retriable_status_codes, vec![500, 503, 504]);
        assert_eq!(defaults.retry_host_predicate[0].name, PREVIOUS_HOSTS_PREDICATE);

        let custom = settings(&[
            (ATTR_CLUSTER, "upstream"),
            (ATTR_RETRY_ON, "connect-failure,reset"),
            (ATTR_NUM_RETRIES, "7"),
            (ATTR_PER_TRY_TIMEOUT, "21ms"),
            (ATTR_RETRY_ON_STATUS_CODES, "506,507"),
        ])
        .retry
        .unwrap();
        assert_eq!(custom.num_retries, 7);
        assert_eq!(custom.per_try_timeout, Duration::from_millis(21));
        assert_eq!(custom.status_codes, vec![506, 507]);
    }

    #[test]
    fn test_parse_status_codes_skips_non_integers() {
        assert_eq!(parse_status_codes("200,abc,201,206"), vec![200, 201, 206]);
        assert!(parse_status_codes("").is_empty());
    }

    #[test]
    fn test_mirror_policy() {
        let built = settings(&[
            (ATTR_CLUSTER, "upstream"),
            (ATTR_REQUEST_MIRROR_CLUSTER, "second_cluster"),
            (ATTR_REQUEST_MIRROR_PERCENTAGE, "55"),
        ])
        .build();
        let mirror = &route_action(&built).request_mirror_policies[0];
        assert_eq!(mirror.cluster, "second_cluster");
        let fraction = mirror.runtime_fraction.as_ref().and_then(|fraction| fraction.default_value.clone()).unwrap();
        assert_eq!(fraction.numerator, 55);
        assert_eq!(fraction.denominator, DenominatorType::Hundred as i32);

        for (cluster, percentage) in [("second_cluster", "101"), ("second_cluster", "-1"), ("ghost", "10")] {
            let settings = settings(&[
                (ATTR_CLUSTER, "upstream"),
                (ATTR_REQUEST_MIRROR_CLUSTER, cluster),
                (ATTR_REQUEST_MIRROR_PERCENTAGE, percentage),
            ]);
            assert!(settings.mirror.is_none(), "{cluster} {percentage}");
        }
        assert!(settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_REQUEST_MIRROR_CLUSTER, "second_cluster")])
            .mirror
            .is_none());
    }

    #[test]
    fn test_headers_to_add_and_basic_auth() {
        let built = settings(&[
            (ATTR_CLUSTER, "upstream"),
            (ATTR_BASIC_AUTH, "test:123"),
            (ATTR_REQUEST_HEADERS_TO_ADD[0], "name=api"),
            (ATTR_REQUEST_HEADERS_TO_ADD[1], "broken"),
        ])
        .build();

        let headers: Vec<(String, String)> = built
            .request_headers_to_add
            .iter()
            .filter_map(|option| option.header.as_ref())
            .map(|header| (header.key.clone(), header.value.clone()))
            .collect();
        assert_eq!(headers, vec![
            ("Authorization".to_string(), "Basic dGVzdDoxMjM=".to_string()),
            ("name".to_string(), "api".to_string()),
        ]);
    }

    #[test]
    fn test_headers_to_remove_adds_authorization_when_authenticated() {
        let plain = settings(&[(ATTR_CLUSTER, "upstream"), (ATTR_REQUEST_HEADERS_TO_REMOVE, "user-agent")]);
        assert_eq!(plain.headers_to_remove, vec!["user-agent"]);

        let authenticated = settings(&[
            (ATTR_CLUSTER, "upstream"),
            (ATTR_REQUEST_HEADERS_TO_REMOVE, "accept"),
            (ATTR_AUTHENTICATE, "true"),
        ]);
        assert_eq!(authenticated.headers_to_remove, vec!["Authorization", "accept"]);
    }

    #[test]
    fn test_cors_and_rate_limit() {
        let built = settings(&[
            (ATTR_CLUSTER, "upstream"),
            (ATTR_CORS_ALLOW_METHODS, "GET"),
            (ATTR_RATE_LIMITING, "true"),
        ])
        .build();
        assert!(built.typed_per_filter_config.contains_key(CORS_FILTER_NAME));
        assert_eq!(route_action(&built).rate_limits.len(), 1);

        let plain = settings(&[(ATTR_CLUSTER, "upstream")]).build();
        assert!(!plain.typed_per_filter_config.contains_key(CORS_FILTER_NAME));
        assert!(route_action(&plain).rate_limits.is_empty());
    }

    #[test]
    fn test_route_configurations_per_group() {
        let routes = vec![
            Route::new("bikes", "bikes", "prefix", "/bikes")
                .with_attributes(Attributes::from_iter([(ATTR_CLUSTER, "upstream")])),
            Route::new("cars", "cars", "prefix", "/cars")
                .with_attributes(Attributes::from_iter([(ATTR_CLUSTER, "upstream")])),
            Route::new("broken", "cars", "glob", "/x"),
        ];
        let listeners = vec![
            Listener::new("shop", 80, "bikes").with_virtual_hosts(["www.shop.com", "shop.com"]),
            Listener::new("shop_tls", 443, "bikes").with_virtual_hosts(["www.shop.com"]),
        ];

        let configs = build_route_configurations(&routes, &listeners, &known());
        assert_eq!(configs.len(), 2);

        assert_eq!(configs[0].name, "bikes");
        assert_eq!(configs[0].virtual_hosts[0].name, "bikes");
        assert_eq!(configs[0].virtual_hosts[0].domains, vec!["shop.com", "www.shop.com"]);

        assert_eq!(configs[1].name, "cars");
        assert_eq!(configs[1].virtual_hosts[0].domains, vec![WILDCARD_DOMAIN]);
        assert_eq!(configs[1].virtual_hosts[0].routes.len(), 1);
    }

    proptest! {
        #[test]
        fn weighted_total_is_sum_of_weights(weights in prop::collection::vec(1u32..10_000, 1..8)) {
            let value = weights
                .iter()
                .enumerate()
                .map(|(index, weight)| format!("c{index}:{weight}"))
                .collect::<Vec<_>>()
                .join(",");
            let shares = parse_weighted_clusters(&value);
            prop_assert_eq!(shares.len(), weights.len());
            let total: u32 = shares.iter().map(|share| share.weight).sum();
            prop_assert_eq!(total, weights.iter().sum::<u32>());
        }

        #[test]
        fn weighted_parsing_never_yields_zero(value in "[a-z0-9:, ]{0,40}") {
            for share in parse_weighted_clusters(&value) {
                prop_assert!(share.weight >= 1);
                prop_assert!(!share.name.is_empty());
            }
        }
    }
}
