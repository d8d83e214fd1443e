//! gRPC discovery services

mod discovery;
pub mod stream;

pub use discovery::DiscoveryServer;
