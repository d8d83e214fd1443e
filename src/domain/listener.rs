//! Listener domain type
//!
//! A listener is a virtual host: a set of domains on one TCP port, routed through one
//! route group.

use serde::{Deserialize, Serialize};

use super::{
    Attributes, Entity, EntityKind, ATTR_HTTP_PROTOCOL, ATTR_TLS_CERTIFICATE,
    ATTR_TLS_CERTIFICATE_KEY, ATTR_TLS_CIPHER_SUITES, ATTR_TLS_MAXIMUM_VERSION,
    ATTR_TLS_MINIMUM_VERSION,
};

pub const ATTR_ACCESS_LOG_FILE: &str = "AccessLogFile";
pub const ATTR_ACCESS_LOG_FILE_FIELDS: &str = "AccessLogFileFields";
pub const ATTR_ACCESS_LOG_CLUSTER: &str = "AccessLogCluster";
pub const ATTR_ACCESS_LOG_CLUSTER_BUFFER_SIZE: &str = "AccessLogClusterBufferSize";
pub const ATTR_SERVER_NAME: &str = "ServerName";
pub const ATTR_MAX_CONCURRENT_STREAMS: &str = "MaxConcurrentStreams";
pub const ATTR_INITIAL_CONNECTION_WINDOW_SIZE: &str = "InitialConnectionWindowSize";
pub const ATTR_INITIAL_STREAM_WINDOW_SIZE: &str = "InitialStreamWindowSize";
pub const ATTR_IDLE_TIMEOUT: &str = "IdleTimeout";

const KNOWN_ATTRIBUTES: &[&str] = &[
    ATTR_TLS_CERTIFICATE,
    ATTR_TLS_CERTIFICATE_KEY,
    ATTR_TLS_MINIMUM_VERSION,
    ATTR_TLS_MAXIMUM_VERSION,
    ATTR_TLS_CIPHER_SUITES,
    ATTR_HTTP_PROTOCOL,
    ATTR_ACCESS_LOG_FILE,
    ATTR_ACCESS_LOG_FILE_FIELDS,
    ATTR_ACCESS_LOG_CLUSTER,
    ATTR_ACCESS_LOG_CLUSTER_BUFFER_SIZE,
    ATTR_SERVER_NAME,
    ATTR_MAX_CONCURRENT_STREAMS,
    ATTR_INITIAL_CONNECTION_WINDOW_SIZE,
    ATTR_INITIAL_STREAM_WINDOW_SIZE,
    ATTR_IDLE_TIMEOUT,
];

/// Listener as stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listener {
    pub name: String,

    pub display_name: String,

    /// Domains served by this listener
    pub virtual_hosts: Vec<String>,

    pub port: u32,

    /// Route group requests are routed through
    pub route_group: String,

    /// Comma separated policy chain evaluated by the authorization server
    pub policies: String,

    pub attributes: Attributes,

    pub created_at: i64,

    pub last_modified_at: i64,
}

impl Listener {
    pub fn new(name: impl Into<String>, port: u32, route_group: impl Into<String>) -> Self {
        Self { name: name.into(), port, route_group: route_group.into(), ..Default::default() }
    }

    pub fn with_virtual_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.virtual_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Listening port; zero or out of range is absent.
    pub fn listen_port(&self) -> Option<u32> {
        (1..=65535).contains(&self.port).then_some(self.port)
    }

    /// Both certificate and key present; the only condition for TLS on this listener.
    pub fn has_tls_material(&self) -> bool {
        self.attributes.get_trimmed(ATTR_TLS_CERTIFICATE).is_some()
            && self.attributes.get_trimmed(ATTR_TLS_CERTIFICATE_KEY).is_some()
    }
}

impl Entity for Listener {
    const KIND: EntityKind = EntityKind::Listener;

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
