//! Process wiring
//!
//! Builds the entity cache, shared xDS state and the long-running tasks, then runs them
//! until the shutdown token is cancelled or one of the servers fails.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::start_admin_server;
use crate::config::AppConfig;
use crate::storage::{EntityCache, FileEntityStore};
use crate::xds::{start_xds_server, Distributor, XdsState};
use crate::{ControlPlaneError, Result};

/// Capacity of the entity change channel between the cache and the distributor
const NOTIFICATION_BUFFER: usize = 64;

pub async fn run_control_plane(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let store = Arc::new(FileEntityStore::new(&config.store.path));
    let (notifier, notifications) = mpsc::channel(NOTIFICATION_BUFFER);
    let entities = Arc::new(EntityCache::new(store, notifier));

    let state = Arc::new(XdsState::with_shutdown(config.clone(), entities.clone(), shutdown.clone()));
    state.metrics.register_xds_metrics();

    let distributor = tokio::spawn(Distributor::new(state.clone(), notifications).run(shutdown.clone()));
    let refresher = {
        let entities = entities.clone();
        let cancel = shutdown.clone();
        let interval = config.store.refresh_interval();
        tokio::spawn(async move { entities.run(interval, cancel).await })
    };

    info!(store = %config.store.path, "Control plane started");
    let outcome = tokio::try_join!(
        start_xds_server(state.clone(), shutdown.clone().cancelled_owned()),
        start_admin_server(config.admin.clone(), state, shutdown.clone()),
        supervise("distributor", distributor, shutdown.clone()),
    );

    shutdown.cancel();
    if let Err(e) = refresher.await {
        warn!(task = "entity refresh", error = %e, "Background task ended abnormally");
    }

    outcome.map(|_| info!("Control plane stopped"))
}

/// Wait for a background task; ending before shutdown, or panicking, is an error.
async fn supervise(name: &'static str, task: JoinHandle<()>, shutdown: CancellationToken) -> Result<()> {
    match task.await {
        Ok(()) if shutdown.is_cancelled() => Ok(()),
        Ok(()) => {
            error!(task = name, "Background task exited before shutdown");
            Err(ControlPlaneError::internal(format!("{} exited before shutdown", name)))
        }
        Err(e) => {
            error!(task = name, error = %e, "Background task ended abnormally");
            Err(ControlPlaneError::internal(format!("{} ended abnormally: {}", name, e)))
        }
    }
}
