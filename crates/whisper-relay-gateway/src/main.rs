//! Whisper Relay gateway binary.
//!
//! `RUST_LOG=relay=debug cargo run -p whisper-relay-gateway` (see `config.rs` for `RELAY_*`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whisper_relay_core::{create_engine, EngineAdapter};
use whisper_relay_gateway::{router, AppState, GatewayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::load()?;

    // A failed engine load keeps the gateway up: /health reports it and requests get 503.
    let engine = match create_engine(&config.engine_settings()) {
        Ok(engine) => {
            tracing::info!(target: "relay::gateway", engine = engine.name(), "engine loaded");
            EngineAdapter::new(engine)
        }
        Err(e) => {
            tracing::warn!(target: "relay::gateway", error = %e, "engine failed to load");
            EngineAdapter::unavailable(e.to_string())
        }
    };

    let addr = config.bind_addr();
    let app = router(AppState::new(engine, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(target: "relay::gateway", "whisper relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "relay::gateway", error = %e, "ctrl-c handler failed");
    }
    tracing::info!(target: "relay::gateway", "shutting down");
}
