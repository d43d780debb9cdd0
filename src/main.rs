use std::sync::Arc;
use tracing::{error, info};

use identity_api::{
    service::config::{ConfigService, ConfigServiceImpl},
    state::{AppState, StartupError},
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "identity-api failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = match ConfigServiceImpl::new() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            // Logging is configured from the same values; report with defaults.
            identity_api::logging::init("info", Default::default());
            return Err(err.into());
        }
    };
    identity_api::logging::init(&config.values().log_level, config.values().log_format);

    let port = config.port();
    let (state, background) = AppState::new(config).await?;
    let app = identity_api::app(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    info!(addr = %bind_addr, "identity-api listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve);

    background.shutdown().await;
    info!("identity-api stopped");
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
