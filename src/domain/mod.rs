//! Domain layer
//!
//! Entities read from the entity store. They are plain data: the xDS compiler reads them
//! through [`Attributes`] and never mutates them.
//!
//! ## Module Organization
//!
//! - `attribute`: name/value pairs and their typed getters
//! - `cluster`: upstream services
//! - `route`: path-matched rules grouped into route groups
//! - `listener`: virtual hosts bound to a port

pub mod attribute;
pub mod cluster;
pub mod listener;
pub mod route;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use attribute::{parse_duration, Attribute, Attributes};
pub use cluster::Cluster;
pub use listener::Listener;
pub use route::{PathType, Route};

/// Attributes shared by clusters and listeners
pub const ATTR_TLS_CERTIFICATE: &str = "TLSCertificate";
pub const ATTR_TLS_CERTIFICATE_KEY: &str = "TLSCertificateKey";
pub const ATTR_TLS_MINIMUM_VERSION: &str = "TLSMinimumVersion";
pub const ATTR_TLS_MAXIMUM_VERSION: &str = "TLSMaximumVersion";
pub const ATTR_TLS_CIPHER_SUITES: &str = "TLSCipherSuites";
pub const ATTR_HTTP_PROTOCOL: &str = "HTTPProtocol";

pub const VALUE_HTTP_PROTOCOL_11: &str = "HTTP/1.1";
pub const VALUE_HTTP_PROTOCOL_2: &str = "HTTP/2";
pub const VALUE_HTTP_PROTOCOL_3: &str = "HTTP/3";

/// Kind of entity held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Cluster,
    Route,
    Listener,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Cluster, EntityKind::Route, EntityKind::Listener];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cluster => "cluster",
            EntityKind::Route => "route",
            EntityKind::Listener => "listener",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common view over the three entity kinds
pub trait Entity {
    const KIND: EntityKind;

    fn name(&self) -> &str;

    fn attributes(&self) -> &Attributes;

    /// Attribute names the compiler understands for this kind
    fn known_attributes() -> &'static [&'static str];

    /// Attribute names present on this entity that the compiler ignores
    fn unknown_attributes(&self) -> Vec<&str> {
        self.attributes().unknown(Self::known_attributes())
    }
}
