use clap::Parser;
use tracing::debug;

use cyclepay::app::{handle_fatal_error, init_logging, AppConfig};
use cyclepay::cli::{execute_command, Cli};
use cyclepay::config::EngineConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&AppConfig::new(cli.verbose, "info"));
            handle_fatal_error(
                anyhow::Error::new(e).context("Failed to load configuration"),
                cli.verbose,
            )
        }
    };

    init_logging(&AppConfig::new(cli.verbose, config.log_level.clone()));
    debug!("Loaded configuration: {:?}", config.server);

    if let Err(e) = execute_command(cli.command, config).await {
        handle_fatal_error(e, cli.verbose);
    }
}
