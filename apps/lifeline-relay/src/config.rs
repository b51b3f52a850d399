use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Durable chat history blob, exclusively owned by this process.
    pub history_file: PathBuf,
    /// How many recent chat events an identify snapshot carries.
    pub snapshot_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("LIFELINE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            history_file: env::var("LIFELINE_HISTORY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("lifeline-history.json")),
            snapshot_limit: env::var("LIFELINE_SNAPSHOT_LIMIT")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(100),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            history_file: PathBuf::from("lifeline-history.json"),
            snapshot_limit: 100,
        }
    }
}
