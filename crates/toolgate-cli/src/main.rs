//! CLI entry point - the composition root.
//!
//! Loads the config file, initializes logging, and dispatches to the
//! command handlers.

use clap::Parser;

use toolgate_cli::{handlers, Cli, Commands, ToolgateConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = ToolgateConfig::load(&cli.config)?;

    match command {
        Commands::List => {
            handlers::list::execute(&config);
        }
        Commands::Tools { server } => {
            handlers::tools::execute(&config, &server).await?;
        }
        Commands::Doctor => {
            handlers::doctor::execute(&config).await?;
        }
    }

    Ok(())
}
