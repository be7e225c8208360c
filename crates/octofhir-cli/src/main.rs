mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands, LaunchCommands};
use output::print_error;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

/// Returns whether any check failed.
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    if let Commands::Resources = cli.command {
        commands::resources::list(format)?;
        return Ok(false);
    }

    let cfg = config::resolve(&cli)?;
    observability::init_tracing_with_level(&cfg.logging.level);
    let session = cli.session.as_str();

    match &cli.command {
        Commands::Resources => Ok(false),
        Commands::Run(args) => commands::run::run(&cfg, args, session, format).await,
        Commands::Launch(args) => match &args.command {
            LaunchCommands::Authorize(authorize) => {
                commands::launch::authorize(&cfg, authorize, session).await?;
                Ok(false)
            }
            LaunchCommands::Callback(callback) => {
                commands::launch::callback(&cfg, callback, session, format).await
            }
        },
        Commands::Restricted => commands::restricted::restricted(&cfg, session, format).await,
    }
}
