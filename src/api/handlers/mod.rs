pub mod health;
pub mod status;

pub use health::{health_handler, ready_handler};
pub use status::{config_handler, nodes_handler, snapshot_handler};
