//! Aerosense Relay Server
//!
//! Run with: cargo run --bin aerosense-relay
//!
//! # Configuration
//!
//! Loaded from config.toml (config dir, /etc/aerosense, or cwd) with
//! environment overrides:
//! - `AEROSENSE_BROKER_HOST` / `AEROSENSE_BROKER_PORT`: MQTT broker address
//! - `AEROSENSE_TOPIC`: subscription topic
//! - `AEROSENSE_HOST` / `AEROSENSE_PORT`: relay bind address
//! - `AEROSENSE_TOKEN_SECRET`: shared token verification secret
//! - `AEROSENSE_LOG_LEVEL` / `AEROSENSE_LOG_FORMAT`: logging

use aerosense::broker::{spawn_dispatcher, BrokerSubscriber};
use aerosense::config::{Config, LoggingConfig};
use aerosense::server::{serve, AppState};
use aerosense::websocket::{BroadcastHub, HubConfig};
use aerosense::TokenVerifier;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default();
    init_tracing(&config.logging);

    tracing::info!("Starting Aerosense relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Broker: {}:{} topic {}",
        config.broker.host,
        config.broker.port,
        config.broker.topic
    );

    // The hub is constructed before anything that references it and is
    // shared by handle; subscriber, dispatcher, and upgrade handlers all
    // borrow the same registry.
    let hub = Arc::new(BroadcastHub::new(HubConfig::from(&config.hub)));
    let verifier = TokenVerifier::new(&config.auth.token_secret);

    let (events_tx, events_rx) = mpsc::channel(config.broker.queue_capacity);
    let subscriber = BrokerSubscriber::new(&config.broker, events_tx);
    let subscriber_handle = tokio::spawn(subscriber.run());
    let dispatcher_handle = spawn_dispatcher(events_rx, Arc::clone(&hub));

    let state = AppState::new(Arc::clone(&hub), verifier);
    let result = serve(state, &config.server).await;

    // Teardown runs on every exit path, bind failure included: close all
    // live connections, then stop the broker tasks.
    tracing::info!("Shutting down relay...");
    hub.close_all().await;
    subscriber_handle.abort();
    dispatcher_handle.abort();

    result?;
    tracing::info!("Aerosense relay stopped");
    Ok(())
}

/// Initialize tracing from the logging config
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "aerosense={},tower_http=info",
            logging.level
        ))
    });

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
