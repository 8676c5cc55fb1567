//! `anvard`: the Anvar license daemon.
//!
//! Configuration comes from `ANVAR_*` environment variables (see
//! [`anvar::DaemonConfig::from_lookup`]); log verbosity from `RUST_LOG`.

use anvar::{
    AnvarError, DaemonConfig, HttpAuthority, KeyStore, LicenseStore, LicenseValidator,
    RequestServer,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!(error = %e, "anvard exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AnvarError> {
    let config = DaemonConfig::from_env()?;
    config.validate()?;

    let keys = Arc::new(KeyStore::new(&config.key_path));
    // Fail at startup rather than on the first request if the key is unusable.
    keys.get_key()?;

    let store = LicenseStore::new(&config.license_path, keys);
    let authority = Arc::new(HttpAuthority::new(&config)?);
    let validator = Arc::new(LicenseValidator::new(store, authority));
    let server = RequestServer::bind(&config, validator)?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.base_url,
        "anvard started"
    );
    server.serve(shutdown).await?;
    info!("anvard stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<(), AnvarError> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| AnvarError::SignalError(format!("Failed to install SIGTERM handler: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| AnvarError::SignalError(format!("Failed to install SIGINT handler: {}", e)))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        shutdown.cancel();
    });
    Ok(())
}
