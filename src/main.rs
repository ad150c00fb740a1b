//! avlink - AV device connectivity service
//!
//! Telnet session management for a network AVR plus LAN discovery for AVRs
//! and SmartCast TVs, fronted by a small HTTP API.

use avlink::{api, config, session, settings};

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avlink=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting avlink v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::load_config()?;
    tracing::info!("Configuration loaded, port: {}", config.port);

    let settings = Arc::new(settings::SettingsStore::open());

    // Build the AVR session from config, falling back to the last saved
    // target when no host is configured.
    let avr_config = match config.avr.clone() {
        Some(avr) => Some(avr),
        None => {
            let saved = settings.device().await;
            saved.ip.map(|ip| config::AvrConfig {
                host: ip,
                port: saved.port.unwrap_or(23),
                enable_real_connection: true,
                connect_timeout_ms: 2000,
                command_timeout_ms: 3000,
            })
        }
    };

    let avr_session = match &avr_config {
        Some(avr) => {
            tracing::info!("AVR session targeting {}:{}", avr.host, avr.port);
            settings.set_target(&avr.host, avr.port).await;
            Some(session::AvrSession::new(avr, Some(settings.clone())))
        }
        None => {
            tracing::info!("No AVR configured; device routes will return 503");
            None
        }
    };

    let state = api::AppState {
        session: avr_session.clone(),
        settings,
        discovery: config.discovery.clone(),
        started_at: Instant::now(),
    };

    let app = api::create_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(session) = avr_session {
        session.shutdown();
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
