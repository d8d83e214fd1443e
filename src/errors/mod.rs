//! # Error Handling
//!
//! Error handling for the control plane. Per-entity compile problems are never
//! surfaced through these types; they are logged and the entity is skipped.

mod tls;
mod types;

pub use tls::TlsError;
pub use types::{ControlPlaneError, Result};

/// Short alias used across the crate
pub type Error = ControlPlaneError;
