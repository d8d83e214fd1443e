//! # Envoy xDS control plane
//!
//! Compiles cluster, route and listener entities (each carrying free-form attributes) into
//! Envoy configuration and distributes it to proxies as versioned snapshots.
//!
//! ```text
//! EntityStore → EntityCache → Distributor → SnapshotCache → discovery streams → Envoy
//!                    │              │
//!              change notices   compile + version
//! ```
//!
//! - [`storage`]: entity store seam and the polling cache that detects changes
//! - [`domain`]: entities and their attributes
//! - [`xds`]: resource compilers, snapshots, the distribution loop and the gRPC services
//! - [`api`]: read-only admin HTTP endpoints

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod startup;
pub mod storage;
pub mod xds;

pub use config::AppConfig;
pub use errors::{ControlPlaneError, Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
