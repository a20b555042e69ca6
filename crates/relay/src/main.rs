use clap::Parser;
use eyre::Result;

use relay::cli::{Cli, Commands};
use relay::commands::{
    Command, config::ConfigCommand, runs::RunsCommand, serve::ServeCommand,
    workflows::WorkflowsCommand,
};
use relay::config::RelayConfig;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load .env file if it exists
    relay::cli::load_env()?;

    // Level configured via RUST_LOG
    relay_core::utils::tracing::init_tracing(cli.log_dir.as_deref())?;

    let config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            ephemeral,
        } => {
            let config = config.with_overrides(bind, port, cli.run_db, ephemeral);
            ServeCommand { config }.execute().await
        }
        Commands::Workflows => WorkflowsCommand.execute().await,
        Commands::Runs { runs_command } => {
            let config = config.with_overrides(None, None, cli.run_db, false);
            RunsCommand {
                command: runs_command,
                store: config.store,
            }
            .execute()
            .await
        }
        Commands::Config { action } => {
            let config = config.with_overrides(None, None, cli.run_db, false);
            ConfigCommand {
                action,
                config,
                path: cli.config,
            }
            .execute()
            .await
        }
    }
}
