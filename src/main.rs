//! tunedl - Download, convert and tag tracks from a streaming catalog

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod archive;
mod catalog;
mod cli;
mod config;
mod download;
mod library;
mod progress;
mod utils;

#[cfg(test)]
mod test_support;

use cli::{Cli, Commands};
use config::Config;
use progress::ProgressDisplay;
use utils::ProgressLogWriter;

fn init_logging(verbose: bool, display: &ProgressDisplay) {
    let filter = if verbose {
        "tunedl=debug,reqwest=debug"
    } else {
        "tunedl=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(ProgressLogWriter::new(display.clone())),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        command,
        verbose,
        config: config_path,
        overrides,
    } = Cli::parse();

    // Commands that never touch the config file
    let command = match command {
        Commands::Completion { shell } => {
            cli::commands::completion(shell);
            return Ok(());
        }
        Commands::Auth { token, clear } => {
            let display = ProgressDisplay::hidden(Default::default(), Default::default());
            init_logging(verbose, &display);
            return cli::commands::auth(token, clear);
        }
        other => other,
    };

    let mut config = Config::load(config_path.as_deref())?;
    overrides.apply(&mut config);
    config.validate()?;

    let display = ProgressDisplay::new(config.print.clone(), config.progress.clone());
    init_logging(verbose, &display);

    match command {
        Commands::Download { urls, file } => {
            cli::commands::download(config, display, urls, file.as_deref()).await?;
        }
        Commands::Liked => {
            cli::commands::liked(config, display).await?;
        }
        Commands::Playlists { select } => {
            cli::commands::playlists(config, display, select).await?;
        }
        Commands::Followed => {
            cli::commands::followed(config, display).await?;
        }
        Commands::Completion { .. } | Commands::Auth { .. } => {}
    }

    Ok(())
}
