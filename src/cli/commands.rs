//! CLI command handlers

use anyhow::{Context, Result};
use clap_complete::generate;
use colored::Colorize;
use dialoguer::MultiSelect;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::TokenStore;
use crate::catalog::models::CurrentUser;
use crate::catalog::{decode, parse_link, parse_links_file, CatalogApi, CatalogClient, CatalogLink};
use crate::config::Config;
use crate::download::{
    Collaborators, FfmpegConverter, HttpAudioSource, HttpLyricsProvider, TrackDownloader,
};
use crate::library::{Library, Summary};
use crate::progress::{PrintChannel, ProgressDisplay};

/// Handle the `auth` command
pub fn auth(token: Option<String>, clear: bool) -> Result<()> {
    if clear {
        TokenStore::clear()?;
        println!("{}", "Stored access token removed.".green());
        return Ok(());
    }

    TokenStore::authenticate(token)?;
    println!("{}", "Access token stored securely in system keyring.".green().bold());
    Ok(())
}

/// Build the library against the live services
///
/// Ctrl-C cancels in-flight downloads; partial files are cleaned up by the engine.
async fn open_library(config: Config, display: ProgressDisplay) -> Result<Library> {
    let token = TokenStore::load()
        .map_err(|_| anyhow::anyhow!("No access token found. Run 'tunedl auth' first."))?;
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let catalog = CatalogClient::new(&config.api_url, &token, timeout, config.retry_attempts)?;
    let (_, value) = catalog
        .fetch("me")
        .await
        .context("Failed to query the current user")?;
    let user: CurrentUser = decode("me", value)?;
    let premium = user.is_premium();
    info!(
        "Signed in as {} ({})",
        user.display_name.as_deref().unwrap_or(&user.id),
        if premium { "premium" } else { "free" }
    );

    let services = Collaborators {
        catalog: Arc::new(catalog),
        audio: Arc::new(HttpAudioSource::new(&config.stream_url, &token, premium, timeout)?),
        converter: Arc::new(FfmpegConverter::new(
            config.ffmpeg_path.clone(),
            &config.ffmpeg_log_level,
        )),
        lyrics: Arc::new(HttpLyricsProvider::new(&config.lyrics_url, timeout)?),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after cleanup");
            on_interrupt.cancel();
        }
    });

    Ok(Library::new(TrackDownloader::new(
        Arc::new(config),
        services,
        display,
        cancel,
    )))
}

/// Gather links from the command line and an optional links file
///
/// Returns `None` when the links file does not exist.
fn collect_links(
    urls: &[String],
    file: Option<&Path>,
    display: &ProgressDisplay,
) -> Result<Option<Vec<CatalogLink>>> {
    let mut links = Vec::new();
    let mut rejected = Vec::new();

    if let Some(path) = file {
        if !path.exists() {
            display.print(
                PrintChannel::Errors,
                &format!("File {} not found.\n", path.display()).red().to_string(),
            );
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read links from {:?}", path))?;
        let (parsed, bad) = parse_links_file(&contents);
        links.extend(parsed);
        rejected.extend(bad);
    }

    for url in urls {
        match parse_link(url) {
            Some(link) => links.push(link),
            None => rejected.push(url.clone()),
        }
    }

    for input in rejected {
        display.print(
            PrintChannel::Warnings,
            &format!("###   SKIPPING: \"{}\" (NOT A RECOGNIZED LINK)   ###", input)
                .yellow()
                .to_string(),
        );
    }
    Ok(Some(links))
}

fn finish(summary: Summary) {
    println!();
    println!("{}", "Done!".green().bold());
    println!("  {}", summary);
}

/// Handle the `download` command
pub async fn download(
    config: Config,
    display: ProgressDisplay,
    urls: Vec<String>,
    file: Option<&Path>,
) -> Result<()> {
    let Some(links) = collect_links(&urls, file, &display)? else {
        return Ok(());
    };
    if links.is_empty() {
        println!("{}", "Nothing to download.".yellow());
        return Ok(());
    }

    let library = open_library(config, display).await?;
    finish(library.links(&links).await);
    Ok(())
}

/// Handle the `liked` command
pub async fn liked(config: Config, display: ProgressDisplay) -> Result<()> {
    let library = open_library(config, display).await?;
    let summary = library
        .liked()
        .await
        .context("Failed to list liked songs")?;
    finish(summary);
    Ok(())
}

/// Handle the `playlists` command
pub async fn playlists(config: Config, display: ProgressDisplay, select: bool) -> Result<()> {
    let library = open_library(config, display).await?;
    let mut playlists = library
        .user_playlists()
        .await
        .context("Failed to list playlists")?;

    if playlists.is_empty() {
        println!("{}", "No playlists found.".yellow());
        return Ok(());
    }

    if select {
        let names: Vec<String> = playlists.iter().map(|p| p.name.trim().to_string()).collect();
        let chosen = MultiSelect::new()
            .with_prompt("Select playlists (space to toggle, enter to confirm)")
            .items(&names)
            .interact()
            .context("Failed to read playlist selection")?;
        playlists = chosen
            .into_iter()
            .filter_map(|index| playlists.get(index).cloned())
            .collect();
    }

    finish(library.playlists(&playlists).await);
    Ok(())
}

/// Handle the `followed` command
pub async fn followed(config: Config, display: ProgressDisplay) -> Result<()> {
    let library = open_library(config, display).await?;
    let summary = library
        .followed()
        .await
        .context("Failed to list followed artists")?;
    finish(summary);
    Ok(())
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = <super::Cli as clap::CommandFactory>::command();
    generate(shell, &mut cmd, "tunedl", &mut io::stdout());
}
