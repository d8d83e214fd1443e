//! Stream callback registry
//!
//! Tracks discovery streams from open to close. A stream starts unidentified; its first
//! request carrying a node id identifies it. When that node id has no other open stream,
//! the stream's [`Latch`] fires so the distributor can hand the node the latest snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};

use crate::observability::MetricsRecorder;

/// Fires once with a node id, then is gone.
#[derive(Debug)]
pub struct Latch(oneshot::Sender<String>);

/// Waiting half of a [`Latch`]
#[derive(Debug)]
pub struct LatchWaiter(oneshot::Receiver<String>);

impl Latch {
    pub fn new() -> (Latch, LatchWaiter) {
        let (tx, rx) = oneshot::channel();
        (Latch(tx), LatchWaiter(rx))
    }

    pub fn fire(self, node_id: String) {
        // The waiter may already be gone.
        let _ = self.0.send(node_id);
    }
}

impl LatchWaiter {
    /// Node id the latch fired with, or `None` when the latch was dropped unfired.
    pub async fn wait(self) -> Option<String> {
        self.0.await.ok()
    }
}

pub type StreamId = u64;

#[derive(Debug)]
struct StreamEntry {
    label: String,
    node_id: Option<String>,
    latch: Option<Latch>,
}

#[derive(Debug, Default)]
struct Registry {
    streams: HashMap<StreamId, StreamEntry>,
    /// Open stream count per identified node
    nodes: HashMap<String, usize>,
}

/// Result of identifying a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identified {
    pub node_id: String,
    /// No other open stream serves this node
    pub new_node: bool,
}

#[derive(Debug, Default)]
pub struct CallbackRegistry {
    registry: RwLock<Registry>,
    next_stream: AtomicU64,
    metrics: MetricsRecorder,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream; the waiter resolves if this stream turns out to bring a new node.
    pub async fn on_stream_open(&self, label: &str) -> (StreamId, LatchWaiter) {
        let stream_id = self.next_stream.fetch_add(1, Ordering::Relaxed) + 1;
        let (latch, waiter) = Latch::new();

        let mut registry = self.registry.write().await;
        registry
            .streams
            .insert(stream_id, StreamEntry { label: label.to_string(), node_id: None, latch: Some(latch) });
        self.metrics.record_stream_opened();
        debug!(stream_id, stream = %label, open_streams = registry.streams.len(), "Stream opened");

        (stream_id, waiter)
    }

    /// Count a request and identify the stream on its first request with a node id.
    ///
    /// Returns `Some` only for the request that identifies the stream.
    pub async fn on_stream_request(&self, stream_id: StreamId, node_id: Option<&str>, type_url: &str) -> Option<Identified> {
        self.metrics.record_resource_request(type_url);

        let node_id = node_id.filter(|id| !id.is_empty())?;
        let mut registry = self.registry.write().await;
        let Registry { streams, nodes } = &mut *registry;

        let entry = streams.get_mut(&stream_id)?;
        if entry.node_id.is_some() {
            return None;
        }
        entry.node_id = Some(node_id.to_string());

        let count = nodes.entry(node_id.to_string()).or_insert(0);
        *count += 1;
        let new_node = *count == 1;

        let latch = entry.latch.take();
        if new_node {
            if let Some(latch) = latch {
                latch.fire(node_id.to_string());
            }
            info!(node_id, stream_id, stream = %entry.label, "New node connected");
        } else {
            debug!(node_id, stream_id, stream = %entry.label, "Stream identified for known node");
        }
        self.metrics.update_node_count(nodes.len());

        Some(Identified { node_id: node_id.to_string(), new_node })
    }

    /// Remove a stream. Returns the node id when this was the node's last open stream.
    pub async fn on_stream_closed(&self, stream_id: StreamId) -> Option<String> {
        let mut registry = self.registry.write().await;
        let entry = registry.streams.remove(&stream_id)?;
        self.metrics.record_stream_closed();

        let node_id = entry.node_id?;
        let remaining = match registry.nodes.get_mut(&node_id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            debug!(node_id = %node_id, stream_id, "Stream closed, node still connected");
            return None;
        }

        registry.nodes.remove(&node_id);
        self.metrics.update_node_count(registry.nodes.len());
        info!(node_id = %node_id, stream_id, stream = %entry.label, "Node disconnected");
        Some(node_id)
    }

    pub fn on_fetch_request(&self, type_url: &str) {
        self.metrics.record_fetch_request(type_url);
    }

    /// Identified nodes with at least one open stream, sorted.
    pub async fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.registry.read().await.nodes.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    pub async fn stream_count(&self) -> usize {
        self.registry.read().await.streams.len()
    }
}
