use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::observability::MetricsRecorder;
use crate::storage::{EntityCache, EntityLists};
use crate::xds::callbacks::CallbackRegistry;
use crate::xds::resources::compile_resources;
use crate::xds::snapshot::{Snapshot, SnapshotCache};

/// Shared control plane context: configuration, the version counter, the latest snapshot
/// and the entity lists it was compiled from, the entity cache, per-node snapshot
/// assignments and the stream registry. Cancelling `shutdown` ends every open discovery
/// stream.
#[derive(Debug)]
pub struct XdsState {
    pub config: AppConfig,
    version: AtomicU64,
    latest: ArcSwapOption<Snapshot>,
    latest_inputs: ArcSwapOption<EntityLists>,
    pub entities: Arc<EntityCache>,
    pub snapshots: SnapshotCache,
    pub registry: CallbackRegistry,
    pub metrics: MetricsRecorder,
    pub shutdown: CancellationToken,
}

impl XdsState {
    pub fn new(config: AppConfig, entities: Arc<EntityCache>) -> Self {
        Self::with_shutdown(config, entities, CancellationToken::new())
    }

    pub fn with_shutdown(config: AppConfig, entities: Arc<EntityCache>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            version: AtomicU64::new(0),
            latest: ArcSwapOption::empty(),
            latest_inputs: ArcSwapOption::empty(),
            entities,
            snapshots: SnapshotCache::new(),
            registry: CallbackRegistry::new(),
            metrics: MetricsRecorder::new(),
            shutdown,
        }
    }

    /// Counter of the latest snapshot; zero before the first compile.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.load_full()
    }

    /// Compile the current entity lists into a new latest snapshot.
    pub async fn compile(&self, trigger: &str) -> Arc<Snapshot> {
        let lists = self.entities.lists().await;
        self.build(lists, trigger)
    }

    /// Like [`compile`](Self::compile), but returns `None` without compiling when the
    /// entity lists equal the ones behind the latest snapshot.
    pub async fn compile_if_changed(&self, trigger: &str) -> Option<Arc<Snapshot>> {
        let lists = self.entities.lists().await;
        if self.latest().is_some() && self.latest_inputs.load().as_deref() == Some(&lists) {
            return None;
        }
        Some(self.build(lists, trigger))
    }

    fn build(&self, lists: EntityLists, trigger: &str) -> Arc<Snapshot> {
        let started = Instant::now();
        let resources = compile_resources(&lists, &self.config);
        self.metrics.record_compile_duration(started.elapsed().as_secs_f64());

        let counter = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot::new(counter, resources));
        self.latest_inputs.store(Some(Arc::new(lists)));
        self.latest.store(Some(snapshot.clone()));
        self.metrics.record_snapshot(trigger);
        info!(
            version = %snapshot.version(),
            trigger,
            clusters = snapshot.compiled().clusters.len(),
            routes = snapshot.compiled().routes.len(),
            listeners = snapshot.compiled().listeners.len(),
            "Built snapshot"
        );
        snapshot
    }

    /// Assign `snapshot` to every node currently connected.
    pub async fn publish(&self, snapshot: &Arc<Snapshot>) -> usize {
        let nodes = self.registry.nodes().await;
        for node_id in &nodes {
            self.snapshots.set_snapshot(node_id, snapshot.clone());
        }
        info!(version = %snapshot.version(), nodes = nodes.len(), "Published snapshot");
        nodes.len()
    }

    /// Give a node the latest snapshot, if one was built and the node still holds a slot.
    pub fn assign_latest(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        let snapshot = self.latest()?;
        let assigned = self.snapshots.set_snapshot(node_id, snapshot.clone());
        debug!(node_id, version = %snapshot.version(), assigned, "Assigned latest snapshot");
        Some(snapshot)
    }
}
