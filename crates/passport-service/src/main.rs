//! Passport
//!
//! Issues signed tokens, emits encrypted tokens for configured destinations,
//! and publishes the signed key set.

use common::clock::SystemClock;
use common::config::LogFormat;
use passport_service::app::{self, Collaborators};
use passport_service::config::{Config, KeyScheduleFile, DEFAULT_LOG_FILTER};
use passport_service::custodian::kms::KmsCustodian;
use passport_service::routes;
use passport_service::services::recipient_keys::HttpKeySetSource;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    // LOG_FORMAT comes from the same environment; fall back to pretty so a
    // configuration error is still reported.
    let log_format = config
        .as_ref()
        .map(|c| c.observability.log_format)
        .unwrap_or_default();
    init_tracing(log_format);

    info!("Starting Passport");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let schedule = KeyScheduleFile::load(&config.kms_config_path).map_err(|e| {
        error!("Failed to load key schedule: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        jwt_keys = schedule.keys.jwt.len(),
        jose_keys = schedule.keys.jose.len(),
        jwks_keys = schedule.keys.jwks.len(),
        destinations = schedule.destinations.len(),
        "Configuration loaded successfully"
    );

    let metrics_handle = routes::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let key_sets = HttpKeySetSource::new(Duration::from_millis(config.key_set_fetch_timeout_ms))
        .map_err(|e| {
            error!("Failed to build key set client: {}", e);
            e
        })?;

    let collaborators = Collaborators {
        custodian: Arc::new(KmsCustodian::from_env().await),
        key_sets: Arc::new(key_sets),
        clock: Arc::new(SystemClock),
    };

    let bind_address = config.bind_address.clone();
    let state = app::build_state(config, &schedule, collaborators)
        .await
        .map_err(|e| {
            error!("Failed to load keys: {}", e);
            e
        })?;

    let app = routes::build_routes(Arc::new(state), metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Passport listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Passport shutdown complete");

    Ok(())
}

fn init_tracing(log_format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
