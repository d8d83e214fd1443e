use clap::Parser;
use gatekeeper_controlplane::{
    cli::Cli,
    config::load_config,
    observability::{init_observability, log_config_info},
    startup::run_control_plane,
    Result, APP_NAME, VERSION,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; a malformed one is worth a warning.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    if cli.check {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let _log_guard = init_observability(&config.observability).await?;
    info!(app_name = APP_NAME, version = VERSION, "Starting Envoy xDS control plane");
    log_config_info(&config);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            shutdown.cancel();
        });
    }

    if let Err(e) = run_control_plane(config, shutdown).await {
        error!(error = %e, "Control plane failed");
        return Err(e);
    }
    Ok(())
}
