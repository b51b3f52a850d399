mod cache;
mod cli;
mod connection;
mod console;
mod reconcile;
mod reconnect;
mod telemetry;

use std::path::PathBuf;

use clap::Parser;
use lifeline_proto::ClientRole;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{cache::CacheStore, cli::Cli, console::Console, reconnect::ReconnectDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to WARN so chat stays readable on the console
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let role: ClientRole = cli.role.into();
    let sender_label = cli
        .sender
        .unwrap_or_else(|| role.label().to_string());
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    let mut cache = CacheStore::load(&data_dir)?;
    let mut cache_updates = cache.subscribe();
    tokio::spawn(async move {
        while let Some(blob) = cache_updates.recv().await {
            debug!(bytes = blob.len(), "local chat cache rewritten");
        }
    });

    let shutdown = CancellationToken::new();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (link_tx, link_rx) = watch::channel(None);

    let driver = ReconnectDriver {
        url: cli.url,
        role,
        link: link_tx,
        incoming: incoming_tx,
        shutdown: shutdown.clone(),
    };
    tokio::spawn(driver.run());

    if cli.simulate_telemetry {
        tokio::spawn(telemetry::run(
            sender_label.clone(),
            link_rx.clone(),
            shutdown.clone(),
        ));
    }

    let console = Console {
        sender_label,
        cache,
        link: link_rx,
        incoming: incoming_rx,
        shutdown,
    };
    console.run().await
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lifeline")
}
