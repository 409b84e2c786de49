//! Command-line and environment settings for the daemon.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use clock_core::link::StatusVocabulary;

pub const DEFAULT_CONFIG_PATH: &str = "/config/config.json";
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3000";
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:80";
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "sudo shutdown now";

/// Language of the pin controller's status reports.
#[derive(ValueEnum, Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum VocabularyChoice {
    /// `eingeschaltet` / `ausgeschaltet`
    #[default]
    German,
    /// `on` / `off`
    English,
}

impl VocabularyChoice {
    pub fn vocabulary(self) -> StatusVocabulary {
        match self {
            Self::German => StatusVocabulary::GERMAN,
            Self::English => StatusVocabulary::ENGLISH,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "clockd")]
#[command(author, version, about = "Analog clock relay controller", long_about = None)]
pub struct Settings {
    /// Persisted clock state (created with defaults when missing).
    #[arg(long, env = "CLOCK_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// WebSocket URL of the pin controller.
    #[arg(long, env = "CLOCK_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,

    /// Verbs the pin controller uses in its status reports.
    #[arg(long, env = "CLOCK_STATUS_VOCABULARY", value_enum, default_value_t = VocabularyChoice::German)]
    pub status_vocabulary: VocabularyChoice,

    /// Address the HTTP control surface listens on.
    #[arg(long, env = "CLOCK_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: SocketAddr,

    /// Directory with the web UI, served for every non-API path.
    #[arg(long, env = "CLOCK_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Command run after the shutdown button sequence released the relays.
    #[arg(long, env = "CLOCK_SHUTDOWN_COMMAND", default_value = DEFAULT_SHUTDOWN_COMMAND)]
    pub shutdown_command: String,

    /// Log the shutdown command instead of running it.
    #[arg(long, env = "CLOCK_DRY_RUN_SHUTDOWN")]
    pub dry_run_shutdown: bool,
}
