//! Parley terminal chat client.
//!
//! Binary name: `parley`
//!
//! Loads config, sets up logging, then runs the requested command.

mod cli;

use clap::Parser;
use clap_complete::generate;
use secrecy::SecretString;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions need neither config nor logging
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(parley_infra::config::resolve_config_path);
    let mut config = parley_infra::config::load_config(&config_path).await;
    if let Some(filter) = cli::verbosity_filter(cli.verbose) {
        config.log.level = filter.to_string();
    }

    parley_observe::tracing_setup::init_tracing(&config.log)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let result = match cli.command {
        Commands::Chat {
            token,
            gateway,
            page_size,
        } => {
            if let Some(url) = gateway {
                config.gateway.url = url;
            }
            if let Some(size) = page_size {
                config.history.page_size = size;
            }
            cli::chat::loop_runner::run_chat_loop(&config, SecretString::from(token)).await
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    parley_observe::tracing_setup::shutdown_tracing();
    result
}
