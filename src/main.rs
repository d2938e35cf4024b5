use clap::Parser;
use strategy_runner::cli::commands;
use strategy_runner::cli::output::print_error;
use strategy_runner::cli::{Cli, Commands};
use strategy_runner::config::AppConfig;
use strategy_runner::logging::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            print_error(e);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    match cli.command {
        Commands::Run => {
            let _guard = init_logging(&config.logging);
            commands::run_daemon(config).await?;
        }
        Commands::Status { id, json } => {
            init_logging_simple();
            commands::show_status(config, id, json).await?;
        }
        Commands::Activate { id } => {
            init_logging_simple();
            commands::set_active(config, id, true).await?;
        }
        Commands::Deactivate { id } => {
            init_logging_simple();
            commands::set_active(config, id, false).await?;
        }
    }

    Ok(())
}
