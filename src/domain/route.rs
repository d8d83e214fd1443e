//! Route domain type

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Attributes, Entity, EntityKind};

pub const ATTR_CLUSTER: &str = "Cluster";
pub const ATTR_WEIGHTED_CLUSTERS: &str = "WeightedClusters";
pub const ATTR_DIRECT_RESPONSE_STATUS_CODE: &str = "DirectResponseStatusCode";
pub const ATTR_DIRECT_RESPONSE_BODY: &str = "DirectResponseBody";
pub const ATTR_REDIRECT_STATUS_CODE: &str = "RedirectStatusCode";
pub const ATTR_REDIRECT_SCHEME: &str = "RedirectScheme";
pub const ATTR_REDIRECT_HOST_NAME: &str = "RedirectHostName";
pub const ATTR_REDIRECT_PORT: &str = "RedirectPort";
pub const ATTR_REDIRECT_PATH: &str = "RedirectPath";
pub const ATTR_REDIRECT_STRIP_QUERY: &str = "RedirectStripQuery";
pub const ATTR_PREFIX_REWRITE: &str = "PrefixRewrite";
pub const ATTR_HOST_HEADER: &str = "HostHeader";
pub const ATTR_TIMEOUT: &str = "Timeout";
pub const ATTR_RETRY_ON: &str = "RetryOn";
pub const ATTR_PER_TRY_TIMEOUT: &str = "PerTryTimeout";
pub const ATTR_NUM_RETRIES: &str = "NumRetries";
pub const ATTR_RETRY_ON_STATUS_CODES: &str = "RetryOnStatusCodes";
pub const ATTR_REQUEST_MIRROR_CLUSTER: &str = "RequestMirrorCluster";
pub const ATTR_REQUEST_MIRROR_PERCENTAGE: &str = "RequestMirrorPercentage";
pub const ATTR_CORS_ALLOW_CREDENTIALS: &str = "CORSAllowCredentials";
pub const ATTR_CORS_ALLOW_METHODS: &str = "CORSAllowMethods";
pub const ATTR_CORS_ALLOW_HEADERS: &str = "CORSAllowHeaders";
pub const ATTR_CORS_EXPOSE_HEADERS: &str = "CORSExposeHeaders";
pub const ATTR_CORS_MAX_AGE: &str = "CORSMaxAge";
pub const ATTR_REQUEST_HEADERS_TO_ADD: [&str; 5] = [
    "RequestHeaderToAdd1",
    "RequestHeaderToAdd2",
    "RequestHeaderToAdd3",
    "RequestHeaderToAdd4",
    "RequestHeaderToAdd5",
];
pub const ATTR_REQUEST_HEADERS_TO_REMOVE: &str = "RequestHeadersToRemove";
pub const ATTR_BASIC_AUTH: &str = "BasicAuth";
pub const ATTR_AUTHENTICATE: &str = "Authenticate";
/// Older name for [`ATTR_AUTHENTICATE`]
pub const ATTR_EXT_AUTHZ: &str = "ExtAuthz";
pub const ATTR_RATE_LIMITING: &str = "RateLimiting";

const KNOWN_ATTRIBUTES: &[&str] = &[
    ATTR_CLUSTER,
    ATTR_WEIGHTED_CLUSTERS,
    ATTR_DIRECT_RESPONSE_STATUS_CODE,
    ATTR_DIRECT_RESPONSE_BODY,
    ATTR_REDIRECT_STATUS_CODE,
    ATTR_REDIRECT_SCHEME,
    ATTR_REDIRECT_HOST_NAME,
    ATTR_REDIRECT_PORT,
    ATTR_REDIRECT_PATH,
    ATTR_REDIRECT_STRIP_QUERY,
    ATTR_PREFIX_REWRITE,
    ATTR_HOST_HEADER,
    ATTR_TIMEOUT,
    ATTR_RETRY_ON,
    ATTR_PER_TRY_TIMEOUT,
    ATTR_NUM_RETRIES,
    ATTR_RETRY_ON_STATUS_CODES,
    ATTR_REQUEST_MIRROR_CLUSTER,
    ATTR_REQUEST_MIRROR_PERCENTAGE,
    ATTR_CORS_ALLOW_CREDENTIALS,
    ATTR_CORS_ALLOW_METHODS,
    ATTR_CORS_ALLOW_HEADERS,
    ATTR_CORS_EXPOSE_HEADERS,
    ATTR_CORS_MAX_AGE,
    ATTR_REQUEST_HEADERS_TO_ADD[0],
    ATTR_REQUEST_HEADERS_TO_ADD[1],
    ATTR_REQUEST_HEADERS_TO_ADD[2],
    ATTR_REQUEST_HEADERS_TO_ADD[3],
    ATTR_REQUEST_HEADERS_TO_ADD[4],
    ATTR_REQUEST_HEADERS_TO_REMOVE,
    ATTR_BASIC_AUTH,
    ATTR_AUTHENTICATE,
    ATTR_EXT_AUTHZ,
    ATTR_RATE_LIMITING,
];

/// How a route's `path` is matched against the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    Exact,
    Prefix,
    Regex,
}

impl PathType {
    /// Parse a stored path type. Accepts `exact`/`path`, `prefix`, `regex`/`regexp`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" | "path" => Some(PathType::Exact),
            "prefix" => Some(PathType::Prefix),
            "regex" | "regexp" => Some(PathType::Regex),
            _ => None,
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            PathType::Exact => "exact",
            PathType::Prefix => "prefix",
            PathType::Regex => "regex",
        };
        f.write_str(value)
    }
}

/// Route as stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    pub name: String,

    pub display_name: String,

    /// Route group this route belongs to
    pub route_group: String,

    pub path: String,

    /// Kept as a string so unknown types survive the refresh and are reported at compile time
    pub path_type: String,

    pub attributes: Attributes,

    pub created_at: i64,

    pub last_modified_at: i64,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        route_group: impl Into<String>,
        path_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            route_group: route_group.into(),
            path_type: path_type.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn parsed_path_type(&self) -> Option<PathType> {
        PathType::parse(&self.path_type)
    }
}

impl Entity for Route {
    const KIND: EntityKind = EntityKind::Route;

    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn known_attributes() -> &'static [&'static str] {
        KNOWN_ATTRIBUTES
    }
}
