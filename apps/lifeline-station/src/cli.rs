use clap::{Parser, ValueEnum};
use lifeline_proto::ClientRole;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lifeline-station")]
#[command(about = "Lifeline chat and telemetry console for one party")]
pub struct Cli {
    /// Relay URL, e.g. ws://localhost:8080
    #[arg(short, long, default_value = "ws://localhost:8080")]
    pub url: String,

    /// Which party this station speaks for
    #[arg(short, long, value_enum)]
    pub role: RoleArg,

    /// Sender label on outgoing events (defaults to the role's wire label)
    #[arg(long)]
    pub sender: Option<String>,

    /// Directory holding the local chat cache
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Emit synthetic ECG, vitals and location telemetry (field units)
    #[arg(long)]
    pub simulate_telemetry: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RoleArg {
    Hospital,
    FieldUnit,
}

impl From<RoleArg> for ClientRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Hospital => ClientRole::Hospital,
            RoleArg::FieldUnit => ClientRole::FieldUnit,
        }
    }
}
