//! Compile and distribution loop
//!
//! Waits on entity change notifications with a fallback timer. A notification always
//! produces a new snapshot; a timer tick only does so when the entity lists differ from
//! the ones the latest snapshot was compiled from (or none exists yet). Every new snapshot
//! is assigned to every connected node.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::storage::EntityChangeNotification;
use crate::xds::callbacks::LatchWaiter;
use crate::xds::state::XdsState;

pub const TRIGGER_NOTIFICATION: &str = "notification";
pub const TRIGGER_TIMER: &str = "timer";

pub struct Distributor {
    state: Arc<XdsState>,
    notifications: mpsc::Receiver<EntityChangeNotification>,
}

impl Distributor {
    pub fn new(state: Arc<XdsState>, notifications: mpsc::Receiver<EntityChangeNotification>) -> Self {
        Self { state, notifications }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let interval = self.state.config.xds.compile_interval();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(compile_interval_ms = interval.as_millis() as u64, "Distribution loop started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Distribution loop stopped");
                    break;
                }
                notification = self.notifications.recv() => {
                    let Some(notification) = notification else {
                        info!("Entity notification channel closed, distribution loop stopped");
                        break;
                    };
                    let mut kinds = vec![notification.kind];
                    while let Ok(next) = self.notifications.try_recv() {
                        kinds.push(next.kind);
                    }
                    debug!(kinds = ?kinds, "Entity change notification received");
                    self.on_notification().await;
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    self.on_timer().await;
                }
            }
        }
    }

    async fn on_notification(&self) {
        let snapshot = self.state.compile(TRIGGER_NOTIFICATION).await;
        self.state.publish(&snapshot).await;
    }

    async fn on_timer(&self) {
        match self.state.compile_if_changed(TRIGGER_TIMER).await {
            Some(snapshot) => {
                self.state.publish(&snapshot).await;
            }
            None => debug!(version = self.state.version(), "Entities unchanged since latest snapshot, keeping it"),
        }
    }
}

/// Hand the latest snapshot to a stream's node once it turns out to be new.
///
/// Returns immediately when the latch is dropped unfired (stream closed early or belonged
/// to an already connected node).
pub fn spawn_new_node_waiter(state: Arc<XdsState>, waiter: LatchWaiter) {
    tokio::spawn(async move {
        let Some(node_id) = waiter.wait().await else {
            return;
        };
        match state.assign_latest(&node_id) {
            Some(snapshot) => info!(node_id = %node_id, version = %snapshot.version(), "Cold start snapshot assigned"),
            None => debug!(node_id = %node_id, "No snapshot built yet for new node"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::AppConfig;
    use crate::domain::listener::{ATTR_ACCESS_LOG_FILE, ATTR_ACCESS_LOG_FILE_FIELDS};
    use crate::domain::{Attributes, Cluster, Listener};
    use crate::storage::{EntityCache, InMemoryEntityStore};

    struct Harness {
        state: Arc<XdsState>,
        cancel: CancellationToken,
    }

    fn harness(compile_interval_ms: u64) -> Harness {
        harness_with(compile_interval_ms, vec![Cluster::new("people", "people.internal", 8080)], Vec::new())
    }

    fn harness_with(compile_interval_ms: u64, clusters: Vec<Cluster>, listeners: Vec<Listener>) -> Harness {
        let store = Arc::new(InMemoryEntityStore::with_entities(clusters, Vec::new(), listeners));
        let (tx, rx) = mpsc::channel(16);
        let entities = Arc::new(EntityCache::new(store, tx));
        let mut config = AppConfig::default();
        config.xds.compile_interval_ms = compile_interval_ms;
        let state = Arc::new(XdsState::new(config, entities));

        let cancel = CancellationToken::new();
        tokio::spawn(Distributor::new(state.clone(), rx).run(cancel.clone()));
        Harness { state, cancel }
    }

    async fn wait_for_version(state: &XdsState, version: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.version() < version {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("version reached");
    }

    #[tokio::test]
    async fn test_notification_compiles_and_publishes() {
        let harness = harness(60_000);
        wait_for_version(&harness.state, 1).await;

        let (stream, _waiter) = harness.state.registry.on_stream_open("ADS").await;
        let _watcher = harness.state.snapshots.watch("envoy-1");
        harness.state.registry.on_stream_request(stream, Some("envoy-1"), "").await;

        harness.state.entities.refresh().await;
        wait_for_version(&harness.state, 2).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.state.snapshots.get_snapshot("envoy-1").is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        harness.cancel.cancel();
    }

    #[tokio::test]
    async fn test_unchanged_timer_compile_keeps_version() {
        let harness = harness(20);
        wait_for_version(&harness.state, 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(harness.state.version(), 1);
        harness.cancel.cancel();
    }

    #[tokio::test]
    async fn test_timer_keeps_version_for_listener_with_access_log_fields() {
        let listener = Listener::new("web", 80, "web").with_attributes(Attributes::from_iter([
            (ATTR_ACCESS_LOG_FILE, "/var/log/envoy/access.log"),
            (ATTR_ACCESS_LOG_FILE_FIELDS, "a=%A%,b=%B%,c=%C%,d=%D%,e=%E%,f=%F%"),
        ]));
        let harness = harness_with(20, Vec::new(), vec![listener]);
        harness.state.entities.refresh().await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.state.latest().is_none_or(|snapshot| snapshot.compiled().listeners.is_empty()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("listener compiled");
        let version = harness.state.version();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(harness.state.version(), version);
        harness.cancel.cancel();
    }

    #[tokio::test]
    async fn test_new_node_waiter_assigns_latest() {
        let harness = harness(60_000);
        wait_for_version(&harness.state, 1).await;

        let (stream, waiter) = harness.state.registry.on_stream_open("ADS").await;
        spawn_new_node_waiter(harness.state.clone(), waiter);
        let mut receiver = harness.state.snapshots.watch("late-node");
        harness.state.registry.on_stream_request(stream, Some("late-node"), "").await;

        tokio::time::timeout(Duration::from_secs(5), receiver.wait_for(|slot| slot.is_some()))
            .await
            .unwrap()
            .unwrap();
        harness.cancel.cancel();
    }
}
