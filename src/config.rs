// src/config.rs
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::{TagAction, UidFormat};

#[derive(Parser, Debug)]
#[command(name = "type2-tag-service", version, about = "NFC Forum Type 2 tag reader/writer service")]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch PC/SC readers and serve events over WebSocket
    Serve(ServiceConfig),
    /// Format an in-memory NTAG213, write a URL to it and print the analysis
    Demo {
        #[arg(long, default_value = "https://example.com")]
        url: String,
    },
}

/// What happens when a tag is placed on the reader.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InsertAction {
    #[default]
    Analyze,
    Provision,
    Uid,
}

impl From<InsertAction> for TagAction {
    fn from(action: InsertAction) -> Self {
        match action {
            InsertAction::Analyze => TagAction::Analyze,
            InsertAction::Provision => TagAction::Provision,
            InsertAction::Uid => TagAction::Uid,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    #[arg(long, default_value_t = 3500)]
    pub port: u16,

    #[arg(long, value_enum, default_value_t = InsertAction::Analyze)]
    pub on_insert: InsertAction,

    /// Provisioned tags point at <base-url>/r/<UID_HEX>
    #[arg(long, default_value = "https://dnd.qrand.me")]
    pub base_url: String,

    #[arg(long, value_enum, default_value_t = UidFormat::Hex)]
    pub uid_format: UidFormat,

    #[arg(long, default_value_t = 10)]
    pub connect_retries: u32,

    #[arg(long, default_value_t = 100)]
    pub retry_delay_ms: u64,

    /// Wait for one card, run the --on-insert action on it and exit
    #[arg(long)]
    pub once: bool,
}

impl ServiceConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 3500,
            on_insert: InsertAction::Analyze,
            base_url: "https://dnd.qrand.me".to_string(),
            uid_format: UidFormat::Hex,
            connect_retries: 10,
            retry_delay_ms: 100,
            once: false,
        }
    }
}

/// `RUST_LOG` wins; otherwise info, or debug with `--debug`.
pub fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}
