//! # obs-demo - Main Entry Point
//!
//! Start-up order matters: the tracer is built first so its layer can be part of
//! the subscriber, logging is installed next, and only then is anything logged.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use obs_demo::core::error::ServiceResult;
use obs_demo::observability::{logging, DistributedTracer};
use obs_demo::{server, AppConfig, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The subscriber may not be installed if start-up failed early
        eprintln!("obs-demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ServiceResult<()> {
    let config = AppConfig::load().await?;

    let tracer = Arc::new(DistributedTracer::new(&config.observability.tracing));
    logging::init_subscriber(&config.observability.logging, tracer.layer())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting obs-demo");
    tracer.log_status();

    let reconnect = tracer.spawn_reconnect(config.observability.tracing.reconnect_interval);

    let addr = config.server.socket_addr()?;
    let state = AppState::new(config, Arc::clone(&tracer))?;

    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Listening for connections");

    let served = server::run(listener, state).await;

    if let Some(reconnect) = reconnect {
        reconnect.abort();
    }

    info!("Flushing pending spans");
    tracer.shutdown().await;

    served?;
    info!("Shutdown complete");
    Ok(())
}
