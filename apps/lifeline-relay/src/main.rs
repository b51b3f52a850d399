mod cli;
mod config;
mod handlers;
mod history;
mod hub;
mod registry;
mod websocket;

use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    cli::Cli, config::Config, handlers::health_check, history::HistoryLog, hub::Hub,
    websocket::websocket_handler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let mut config = Config::from_env();
    Cli::parse().apply(&mut config);
    info!("Starting Lifeline relay on port {}", config.port);
    info!("Chat history file: {}", config.history_file.display());

    let history = HistoryLog::load(config.history_file.clone()).await;
    info!("History log holds {} chat events", history.len());
    let (hub, handle) = Hub::new(history, config.snapshot_limit);
    tokio::spawn(hub.run());

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .with_state(handle)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Lifeline relay listening on {}", addr);

    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
