//! In-memory entity cache
//!
//! Holds the latest copy of the three entity lists as one unit. A refresh loads every kind
//! from the store in one go; if the load fails the previous lists are kept. A list is
//! only replaced, and a change notification only sent, when its contents differ from what
//! is held.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{EntityChangeNotification, EntityStore};
use crate::domain::{Cluster, Entity, EntityKind, Listener, Route};
use crate::observability::MetricsRecorder;

/// Consistent read of all three lists for one compile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityLists {
    pub clusters: Arc<Vec<Cluster>>,
    pub routes: Arc<Vec<Route>>,
    pub listeners: Arc<Vec<Listener>>,
}

pub struct EntityCache {
    store: Arc<dyn EntityStore>,
    lists: RwLock<EntityLists>,
    notifier: mpsc::Sender<EntityChangeNotification>,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache").finish_non_exhaustive()
    }
}

impl EntityCache {
    pub fn new(store: Arc<dyn EntityStore>, notifier: mpsc::Sender<EntityChangeNotification>) -> Self {
        Self { store, lists: RwLock::default(), notifier, metrics: MetricsRecorder::new() }
    }

    pub async fn clusters(&self) -> Arc<Vec<Cluster>> {
        self.lists.read().await.clusters.clone()
    }

    pub async fn routes(&self) -> Arc<Vec<Route>> {
        self.lists.read().await.routes.clone()
    }

    pub async fn listeners(&self) -> Arc<Vec<Listener>> {
        self.lists.read().await.listeners.clone()
    }

    pub async fn lists(&self) -> EntityLists {
        self.lists.read().await.clone()
    }

    /// Load every kind from the store and return the kinds whose lists changed.
    pub async fn refresh(&self) -> Vec<EntityKind> {
        let document = match self.store.load_all().await {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "Failed to read entities, keeping previous copy");
                return Vec::new();
            }
        };

        let mut changed = Vec::new();
        {
            let mut lists = self.lists.write().await;
            if replace_if_changed(&mut lists.clusters, document.clusters, &self.metrics) {
                changed.push(EntityKind::Cluster);
            }
            if replace_if_changed(&mut lists.routes, document.routes, &self.metrics) {
                changed.push(EntityKind::Route);
            }
            if replace_if_changed(&mut lists.listeners, document.listeners, &self.metrics) {
                changed.push(EntityKind::Listener);
            }
        }

        for kind in &changed {
            if self.notifier.send(EntityChangeNotification { kind: *kind }).await.is_err() {
                debug!(kind = %kind, "No receiver for entity change notification");
            }
        }

        changed
    }

    /// Refresh on a fixed interval until cancelled. The first refresh runs immediately.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = interval.as_millis() as u64, "Entity cache refresh started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Entity cache refresh stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.refresh().await;
                }
            }
        }
    }
}

fn replace_if_changed<T>(slot: &mut Arc<Vec<T>>, entities: Vec<T>, metrics: &MetricsRecorder) -> bool
where
    T: Entity + PartialEq,
{
    if slot.as_slice() == entities.as_slice() {
        return false;
    }

    for entity in &entities {
        let unknown = entity.unknown_attributes();
        if !unknown.is_empty() {
            warn!(
                kind = %T::KIND,
                entity = %entity.name(),
                attributes = ?unknown,
                "Ignoring unknown attributes"
            );
        }
    }

    metrics.update_entity_count(T::KIND.as_str(), entities.len());
    info!(kind = %T::KIND, count = entities.len(), "Entity list changed");
    *slot = Arc::new(entities);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attributes;
    use crate::storage::InMemoryEntityStore;
    use tracing_test::traced_test;

    fn cache_with(store: Arc<InMemoryEntityStore>) -> (EntityCache, mpsc::Receiver<EntityChangeNotification>) {
        let (tx, rx) = mpsc::channel(16);
        (EntityCache::new(store, tx), rx)
    }

    #[tokio::test]
    async fn test_refresh_reports_changed_kinds_once() {
        let store = Arc::new(InMemoryEntityStore::with_entities(
            vec![Cluster::new("people", "people.internal", 80)],
            vec![],
            vec![],
        ));
        let (cache, mut rx) = cache_with(store.clone());

        assert_eq!(cache.refresh().await, vec![EntityKind::Cluster]);
        assert_eq!(rx.recv().await, Some(EntityChangeNotification { kind: EntityKind::Cluster }));
        assert_eq!(cache.clusters().await.len(), 1);

        assert!(cache.refresh().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deletion_is_a_change() {
        let store = Arc::new(InMemoryEntityStore::with_entities(
            vec![Cluster::new("people", "people.internal", 80)],
            vec![],
            vec![],
        ));
        let (cache, _rx) = cache_with(store.clone());
        cache.refresh().await;

        store.set_clusters(vec![]).await;
        assert_eq!(cache.refresh().await, vec![EntityKind::Cluster]);
        assert!(cache.clusters().await.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_read_error_keeps_previous_copy() {
        let store = Arc::new(InMemoryEntityStore::with_entities(
            vec![Cluster::new("people", "people.internal", 80)],
            vec![],
            vec![],
        ));
        let (cache, _rx) = cache_with(store.clone());
        cache.refresh().await;

        store.set_unavailable(true);
        assert!(cache.refresh().await.is_empty());
        assert_eq!(cache.clusters().await.len(), 1);
        assert!(logs_contain("keeping previous copy"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_attributes_are_logged_not_rejected() {
        let cluster = Cluster::new("people", "people.internal", 80)
            .with_attributes(Attributes::from_iter([("Colour", "blue")]));
        let store = Arc::new(InMemoryEntityStore::with_entities(vec![cluster], vec![], vec![]));
        let (cache, _rx) = cache_with(store);

        assert_eq!(cache.refresh().await, vec![EntityKind::Cluster]);
        assert_eq!(cache.clusters().await.len(), 1);
        assert!(logs_contain("Ignoring unknown attributes"));
        assert!(logs_contain("Colour"));
    }

    /// Serves new clusters but fails to read routes.
    struct HalfBrokenStore;

    #[async_trait::async_trait]
    impl EntityStore for HalfBrokenStore {
        async fn clusters(&self) -> crate::errors::Result<Vec<Cluster>> {
            Ok(vec![Cluster::new("orders", "orders.internal", 80)])
        }

        async fn routes(&self) -> crate::errors::Result<Vec<Route>> {
            Err(crate::errors::ControlPlaneError::storage("routes table locked"))
        }

        async fn listeners(&self) -> crate::errors::Result<Vec<Listener>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_kind_keeps_every_list() {
        let (tx, _rx) = mpsc::channel(16);
        let cache = EntityCache::new(Arc::new(HalfBrokenStore), tx);
        assert!(cache.refresh().await.is_empty());
        assert!(cache.clusters().await.is_empty());
    }

    #[tokio::test]
    async fn test_lists_change_together() {
        let store = Arc::new(InMemoryEntityStore::with_entities(
            vec![Cluster::new("people", "people.internal", 80)],
            vec![Route::new("people", "web", "prefix", "/people")],
            vec![],
        ));
        let (cache, _rx) = cache_with(store.clone());
        cache.refresh().await;
        let before = cache.lists().await;

        store.set_clusters(vec![Cluster::new("orders", "orders.internal", 80)]).await;
        store.set_routes(vec![Route::new("orders", "web", "prefix", "/orders")]).await;
        assert_eq!(cache.refresh().await, vec![EntityKind::Cluster, EntityKind::Route]);

        let after = cache.lists().await;
        assert_eq!(after.clusters[0].name, "orders");
        assert_eq!(after.routes[0].name, "orders");
        assert!(Arc::ptr_eq(&before.listeners, &after.listeners));
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(InMemoryEntityStore::new());
        let (cache, _rx) = cache_with(store);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), cache.run(Duration::from_millis(10), cancel))
            .await
            .expect("run should return after cancellation");
    }
}
