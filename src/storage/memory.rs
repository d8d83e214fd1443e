//! In-memory entity store for tests and embedders

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::EntityStore;
use crate::domain::{Cluster, Listener, Route};
use crate::errors::{ControlPlaneError, Result};

#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    clusters: RwLock<Vec<Cluster>>,
    routes: RwLock<Vec<Route>>,
    listeners: RwLock<Vec<Listener>>,
    unavailable: AtomicBool,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(clusters: Vec<Cluster>, routes: Vec<Route>, listeners: Vec<Listener>) -> Self {
        Self {
            clusters: RwLock::new(clusters),
            routes: RwLock::new(routes),
            listeners: RwLock::new(listeners),
            unavailable: AtomicBool::new(false),
        }
    }

    pub async fn set_clusters(&self, clusters: Vec<Cluster>) {
        *self.clusters.write().await = clusters;
    }

    pub async fn set_routes(&self, routes: Vec<Route>) {
        *self.routes.write().await = routes;
    }

    pub async fn set_listeners(&self, listeners: Vec<Listener>) {
        *self.listeners.write().await = listeners;
    }

    /// Make every read fail until switched back, mimicking a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::storage("Entity store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn clusters(&self) -> Result<Vec<Cluster>> {
        self.check_available()?;
        Ok(self.clusters.read().await.clone())
    }

    async fn routes(&self) -> Result<Vec<Route>> {
        self.check_available()?;
        Ok(self.routes.read().await.clone())
    }

    async fn listeners(&self) -> Result<Vec<Listener>> {
        self.check_available()?;
        Ok(self.listeners.read().await.clone())
    }
}
