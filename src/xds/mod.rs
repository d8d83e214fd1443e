//! Envoy xDS (eXtended Discovery Service) implementation
//!
//! Compiles the entity lists into Envoy clusters, route configurations and listeners,
//! versions them as snapshots, and serves them over gRPC:
//! - ADS (Aggregated Discovery Service)
//! - CDS (Cluster Discovery Service)
//! - RDS (Route Discovery Service)
//! - LDS (Listener Discovery Service)
//! - EDS (Endpoint Discovery Service, always empty; clusters resolve hosts by DNS)

pub mod access_log;
pub mod callbacks;
pub mod cluster;
pub mod distributor;
pub mod filters;
pub mod helpers;
pub mod listener;
pub mod resources;
pub mod route;
pub mod server;
pub mod services;
pub mod snapshot;
pub mod state;
pub mod tls;

pub use distributor::Distributor;
pub use resources::{compile_resources, BuiltResource, CompiledResources};
pub use server::{serve_xds, start_xds_server};
pub use snapshot::{Snapshot, SnapshotCache};
pub use state::XdsState;
