//! CLI command definitions for the `parley` binary.

pub mod chat;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Talk to customer service from your terminal.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config.toml (defaults to $PARLEY_CONFIG or ~/.parley/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Detailed logs on stderr (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a chat session.
    Chat {
        /// Bearer token for the chat backend.
        #[arg(long, env = "PARLEY_TOKEN", hide_env_values = true)]
        token: String,

        /// Override the gateway websocket URL.
        #[arg(long)]
        gateway: Option<String>,

        /// Override the history page size.
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Log filter for a `-v` count, or `None` to keep the configured level.
pub fn verbosity_filter(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info,parley_core=debug,parley_infra=debug"),
        _ => Some("trace"),
    }
}
