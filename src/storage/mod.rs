//! # Entity Storage
//!
//! The seam between the control plane and wherever entities are authored. The compiler
//! never talks to a store directly: [`EntityCache`] polls an [`EntityStore`], keeps the
//! latest lists in memory and reports which kinds changed.

pub mod cache;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cache::{EntityCache, EntityLists};
pub use file::FileEntityStore;
pub use memory::InMemoryEntityStore;

use crate::domain::{Cluster, EntityKind, Listener, Route};
use crate::errors::Result;

/// Read access to the full entity lists
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn clusters(&self) -> Result<Vec<Cluster>>;

    async fn routes(&self) -> Result<Vec<Route>>;

    async fn listeners(&self) -> Result<Vec<Listener>>;

    /// Read all three kinds for one refresh; any failed read fails the whole load.
    async fn load_all(&self) -> Result<EntityDocument> {
        Ok(EntityDocument {
            clusters: self.clusters().await?,
            routes: self.routes().await?,
            listeners: self.listeners().await?,
        })
    }
}

/// All entity lists read together. Also the on-disk layout of the entity file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityDocument {
    pub clusters: Vec<Cluster>,
    pub routes: Vec<Route>,
    pub listeners: Vec<Listener>,
}

/// Sent once per entity kind whose list changed during a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityChangeNotification {
    pub kind: EntityKind,
}
