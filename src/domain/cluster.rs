//! Cluster domain type
//!
//! One upstream service the proxy fleet can route to. The upstream address is taken from
//! `hostName`/`port`; entities written before those fields existed carry it in the `Host`
//! and `Port` attributes instead.

use serde::{Deserialize, Serialize};

use super::{
    Attributes, Entity, EntityKind, ATTR_HTTP_PROTOCOL, ATTR_TLS_CERTIFICATE,
    ATTR_TLS_CERTIFICATE_KEY, ATTR_TLS_CIPHER_SUITES, ATTR_TLS_MAXIMUM_VERSION,
    ATTR_TLS_MINIMUM_VERSION,
};

pub const ATTR_HOST: &str = "Host";
pub const ATTR_PORT: &str = "Port";
pub const ATTR_CONNECT_TIMEOUT: &str = "ConnectTimeout";
pub const ATTR_IDLE_TIMEOUT: &str = "IdleTimeout";
pub const ATTR_TLS: &str = "TLS";
pub const ATTR_SNI_HOST_NAME: &str = "SNIHostName";
pub const ATTR_HEALTH_CHECK_PROTOCOL: &str = "HealthCheckProtocol";
pub const ATTR_HEALTH_CHECK_HOST_HEADER: &str = "HealthCheckHostHeader";
pub const ATTR_HEALTH_CHECK_PATH: &str = "HealthCheckPath";
pub const ATTR_HEALTH_CHECK_INTERVAL: &str = "HealthCheckInterval";
pub const ATTR_HEALTH_CHECK_TIMEOUT: &str = "HealthCheckTimeout";
pub const ATTR_HEALTH_CHECK_UNHEALTHY_THRESHOLD: &str = "HealthCheckUnhealthyThreshold";
pub const ATTR_HEALTH_CHECK_HEALTHY_THRESHOLD: &str = "HealthCheckHealthyThreshold";
pub const ATTR_HEALTH_CHECK_LOG_FILE: &str = "HealthCheckLogFile";
pub const ATTR_MAX_CONNECTIONS: &str = "MaxConnections";
pub const ATTR_MAX_PENDING_REQUESTS: &str = "MaxPendingRequests";
pub const ATTR_MAX_REQUESTS: &str = "MaxRequests";
pub const ATTR_MAX_RETRIES: &str = "MaxRetries";
pub const ATTR_DNS_LOOKUP_FAMILY: &str = "DNSLookupFamily";
pub const ATTR_DNS_REFRESH_RATE: &str = "DNSRefreshRate";
pub const ATTR_DNS_RESOLVERS: &str = "DNSResolvers";
pub const ATTR_LB_POLICY: &str = "LbPolicy";

pub const VALUE_HEALTH_CHECK_PROTOCOL_HTTP: &str = "HTTP";

const KNOWN_ATTRIBUTES: &[&str] = &[
    ATTR_HOST,
    ATTR_PORT,
    ATTR_CONNECT_TIMEOUT,
    ATTR_IDLE_TIMEOUT,
    ATTR_TLS,
    ATTR_SNI_HOST_NAME,
    ATTR_HEALTH_CHECK_PROTOCOL,
    ATTR_HEALTH_CHECK_HOST_HEADER,
    ATTR_HEALTH_CHECK_PATH,
    ATTR_HEALTH_CHECK_INTERVAL,
    ATTR_HEALTH_CHECK_TIMEOUT,
    ATTR_HEALTH_CHECK_UNHEALTHY_THRESHOLD,
    ATTR_HEALTH_CHECK_HEALTHY_THRESHOLD,
    ATTR_HEALTH_CHECK_LOG_FILE,
    ATTR_MAX_CONNECTIONS,
    ATTR_MAX_PENDING_REQUESTS,
    ATTR_MAX_REQUESTS,
    ATTR_MAX_RETRIES,
    ATTR_DNS_LOOKUP_FAMILY,
    ATTR_DNS_REFRESH_RATE,
    ATTR_DNS_RESOLVERS,
    ATTR_LB_POLICY,
    ATTR_HTTP_PROTOCOL,
    ATTR_TLS_MINIMUM_VERSION,
    ATTR_TLS_MAXIMUM_VERSION,
    ATTR_TLS_CIPHER_SUITES,
    ATTR_TLS_CERTIFICATE,
    ATTR_TLS_CERTIFICATE_KEY,
];

/// Upstream cluster as stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    /// Name of cluster, referenced by routes
    pub name: String,

    pub display_name: String,

    /// Upstream hostname
    pub host_name: String,

    /// Upstream port
    pub port: u32,

    pub attributes: Attributes,

    /// Epoch milliseconds
    pub created_at: i64,

    /// Epoch milliseconds
    pub last_modified_at: i64,
}

impl Cluster {
    pub fn new(name: impl Into<String>, host_name: impl Into<String>, port: u32) -> Self {
        Self { name: name.into(), host_name: host_name.into(), port, ..Default::default() }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Upstream host, falling back to the `Host` attribute.
    pub fn upstream_host(&self) -> Option<&str> {
        let host = self.host_name.trim();
        if !host.is_empty() {
            return Some(host);
        }
        self.attributes.get_trimmed(ATTR_HOST)
    }

    /// Upstream port, falling back to the `Port` attribute. Zero or out of range is absent.
    pub fn upstream_port(&self) -> Option<u32> {
        let port = if self.port != 0 { self.port } else { self.attributes.get_u32(ATTR_PORT, 0) };
        (1..=65535).contains(&port).then_some(port)
    }
}

impl Entity for Cluster {
    const KIND: EntityKind = EntityKind::Cluster;

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
