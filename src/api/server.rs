use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{config::AdminConfig, errors::Error, xds::XdsState};

use super::routes::build_router;

/// Serve the admin endpoints until `cancel` fires.
pub async fn start_admin_server(
    config: AdminConfig,
    state: Arc<XdsState>,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid admin address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind admin server: {}", e)))?;

    info!(address = %addr, "Starting admin HTTP server");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::transport(format!("Admin server error: {}", e)))?;

    info!("Admin server shutdown completed");
    Ok(())
}
