//! Versioned snapshots and the per-node snapshot cache

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::xds::resources::{BuiltResource, CompiledResources};

/// One immutable, versioned bundle of compiled resources.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    version: String,
    counter: u64,
    created_at: DateTime<Utc>,
    resources: CompiledResources,
}

impl Snapshot {
    /// Version strings read `<RFC 3339 UTC>-V<counter>`; the counter makes two snapshots
    /// built within the same second distinct.
    pub fn new(counter: u64, resources: CompiledResources) -> Self {
        let created_at = Utc::now();
        let version = format!("{}-V{}", created_at.to_rfc3339_opts(SecondsFormat::Secs, true), counter);
        Self { version, counter, created_at, resources }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Ordering key; the version string is not lexically ordered.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn compiled(&self) -> &CompiledResources {
        &self.resources
    }

    pub fn resources(&self, type_url: &str) -> &[BuiltResource] {
        self.resources.by_type(type_url)
    }

    pub fn resource_names(&self, type_url: &str) -> Vec<&str> {
        self.resources(type_url).iter().map(|resource| resource.name.as_str()).collect()
    }
}

pub type SnapshotSlot = Option<Arc<Snapshot>>;

/// Latest snapshot assigned to each node.
///
/// Every node has a `watch` channel; streams serving that node subscribe to it and push
/// whenever a newer snapshot lands.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    nodes: DashMap<String, watch::Sender<SnapshotSlot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a node's assignments, creating an empty slot for unseen nodes.
    pub fn watch(&self, node_id: &str) -> watch::Receiver<SnapshotSlot> {
        self.nodes
            .entry(node_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Assign `snapshot` to a node that holds a slot. Older or equal snapshots never
    /// replace a newer one, and nodes without a slot are left alone.
    ///
    /// Returns whether the assignment took effect.
    pub fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> bool {
        let Some(sender) = self.nodes.get(node_id).map(|entry| entry.value().clone()) else {
            debug!(node_id, version = snapshot.counter(), "Node holds no snapshot slot, skipping assignment");
            return false;
        };

        let counter = snapshot.counter();
        let updated = sender.send_if_modified(|slot| match slot {
            Some(current) if current.counter() >= counter => false,
            _ => {
                *slot = Some(snapshot);
                true
            }
        });
        debug!(node_id, version = counter, updated, "Assigned snapshot to node");
        updated
    }

    pub fn get_snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        self.nodes.get(node_id).and_then(|sender| sender.borrow().clone())
    }

    /// Node ids holding a slot, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Drop a node's slot once nothing watches it any more.
    pub fn clear_node(&self, node_id: &str) -> bool {
        self.nodes.remove_if(node_id, |_, sender| sender.receiver_count() == 0).is_some()
    }
}
