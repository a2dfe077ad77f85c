use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_coordinator::api;
use delivery_coordinator::config::{Config, LogFormat};
use delivery_coordinator::error::AppError;
use delivery_coordinator::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let shared_state = Arc::new(AppState::new(config.subscriber_buffer_size, config.fare));
    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shared_state.clone()))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::new(config.log_level.clone());

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }

    tracing::info!(
        connections = state.events.connection_count(),
        "shutting down; closing subscribers"
    );
    state.events.close_all();
}
