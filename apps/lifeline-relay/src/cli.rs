use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "lifeline-relay")]
#[command(about = "Lifeline relay hub for hospital/field-unit chat and telemetry")]
pub struct Cli {
    /// Port to listen on (overrides LIFELINE_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path of the durable chat history blob (overrides LIFELINE_HISTORY_FILE)
    #[arg(long)]
    pub history_file: Option<PathBuf>,

    /// Number of recent chat events sent in an identify snapshot
    #[arg(long)]
    pub snapshot_limit: Option<usize>,
}

impl Cli {
    pub fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(history_file) = self.history_file {
            config.history_file = history_file;
        }
        if let Some(snapshot_limit) = self.snapshot_limit {
            config.snapshot_limit = snapshot_limit;
        }
    }
}
