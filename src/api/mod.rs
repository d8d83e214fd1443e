//! # Admin HTTP surface
//!
//! Read-only endpoints for probes and operators: health, readiness, the effective
//! configuration, the latest snapshot and per-node assignments.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use routes::build_router;
pub use server::start_admin_server;
