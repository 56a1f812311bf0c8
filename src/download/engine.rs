//! Single-track download state machine
//!
//! ```text
//! Preparing ─┬─ MetadataFailed
//!            ├─ Unplayable
//!            ├─ SkipExists
//!            ├─ SkipPreviouslyDownloaded
//!            └─ Streaming ─┬─ StreamFailed
//!                          └─ Transcoding → Tagging → Placing → Recorded
//! ```
//!
//! Every failure is caught here and turned into a [`DownloadOutcome`]; nothing
//! propagates to the traversal that asked for the track.

use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ConvertError, DownloadError, MetadataError};
use super::lyrics::{write_lrc, LyricsDocument, LyricsProvider};
use super::metadata::{MetadataResolver, TrackMetadata};
use super::path::{
    has_content, CollisionRegistry, ExtraKeys, OutputMode, PathClaim, PathResolver,
    TrackReservation,
};
use super::stream::{stream_to_file, AudioSource, StreamOptions};
use super::tags::{write_tags, TrackTags};
use super::transcode::{transcode_bitrate, Converter};
use crate::archive::{ArchiveScope, ArchiveStore};
use crate::catalog::CatalogApi;
use crate::config::Config;
use crate::progress::{Level, PrintChannel, ProgressDisplay, RowChain};
use crate::utils::{format_bytes, format_elapsed, sanitize_filename};

/// Terminal state of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Written to this path
    Completed(PathBuf),
    SkippedUnavailable,
    SkippedExists,
    SkippedAlreadyDownloaded,
    FailedMetadata,
    FailedGeneral,
}

/// One track to fetch, with the caller's template variables
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub id: String,
    pub mode: OutputMode,
    pub extra: ExtraKeys,
}

impl TrackRequest {
    pub fn new(id: impl Into<String>, mode: OutputMode) -> Self {
        Self {
            id: id.into(),
            mode,
            extra: ExtraKeys::new(),
        }
    }

    pub fn with_extra(mut self, extra: ExtraKeys) -> Self {
        self.extra = extra;
        self
    }

    fn describe_extra(&self) -> String {
        let pairs: Vec<String> = self
            .extra
            .iter()
            .map(|(k, v)| format!("\"{}\": \"{}\"", k, v))
            .collect();
        format!("Extra_Keys {{{}}}", pairs.join(", "))
    }
}

/// External services the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogApi>,
    pub audio: Arc<dyn AudioSource>,
    pub converter: Arc<dyn Converter>,
    pub lyrics: Arc<dyn LyricsProvider>,
}

/// Everything decided before any byte is streamed
struct Prepared {
    meta: TrackMetadata,
    song_name: String,
    /// `None` while the same track is already being written to `dir`
    slot: Option<Slot>,
    dir: PathBuf,
    known_locally: bool,
    known_globally: bool,
    name_has_content: bool,
}

/// Destination and track reservation, both held until the pipeline ends
struct Slot {
    claim: PathClaim,
    _reservation: TrackReservation,
}

/// In-flight temporary files, removed on drop unless handed off
struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    fn track(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove temp file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Downloads single tracks end to end
#[derive(Clone)]
pub struct TrackDownloader {
    config: Arc<Config>,
    services: Collaborators,
    metadata: MetadataResolver,
    paths: PathResolver,
    collisions: CollisionRegistry,
    archive: Arc<ArchiveStore>,
    display: ProgressDisplay,
    cancel: CancellationToken,
}

impl TrackDownloader {
    pub fn new(
        config: Arc<Config>,
        services: Collaborators,
        display: ProgressDisplay,
        cancel: CancellationToken,
    ) -> Self {
        let archive =
            ArchiveStore::new(config.song_archive_path(), config.disable_directory_archives);
        Self {
            metadata: MetadataResolver::new(services.catalog.clone()),
            paths: PathResolver::from_config(&config),
            collisions: CollisionRegistry::new(),
            archive: Arc::new(archive),
            config,
            services,
            display,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogApi> {
        &self.services.catalog
    }

    pub fn display(&self) -> &ProgressDisplay {
        &self.display
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the pipeline for one track below the given ancestor chain
    pub async fn download(&self, request: &TrackRequest, chain: &RowChain) -> DownloadOutcome {
        let prepared = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.display.print(
                    PrintChannel::Errors,
                    &format!(
                        "{}\n{}\n{}\n",
                        format!(
                            "###   SKIPPING SONG - FAILED TO QUERY METADATA - Track_ID: {}   ###",
                            request.id
                        )
                        .red(),
                        request.describe_extra(),
                        error_chain(&e)
                    ),
                );
                return DownloadOutcome::FailedMetadata;
            }
        };

        let config = &self.config;
        let song_name = &prepared.song_name;

        if !prepared.meta.is_playable {
            self.skip_banner(song_name, "SONG IS UNAVAILABLE");
            return DownloadOutcome::SkippedUnavailable;
        }
        let Some(slot) = &prepared.slot else {
            self.skip_banner(song_name, "SONG ALREADY EXISTS");
            return DownloadOutcome::SkippedExists;
        };
        if prepared.known_locally
            && prepared.name_has_content
            && config.skip_existing
            && !config.disable_directory_archives
        {
            self.skip_banner(song_name, "SONG ALREADY EXISTS");
            return DownloadOutcome::SkippedExists;
        }
        if prepared.known_globally && config.skip_previously_downloaded {
            self.skip_banner(song_name, "SONG ALREADY DOWNLOADED ONCE");
            return DownloadOutcome::SkippedAlreadyDownloaded;
        }

        match self.acquire(request, &prepared, slot.claim.path(), chain).await {
            Ok(path) => {
                self.courtesy_wait().await;
                DownloadOutcome::Completed(path)
            }
            Err(e) => {
                self.display.print(
                    PrintChannel::Errors,
                    &format!(
                        "{}\n{}\n{}\n",
                        format!(
                            "###   SKIPPING: {} (GENERAL DOWNLOAD ERROR) - Track_ID: {}   ###",
                            song_name, prepared.meta.id
                        )
                        .red(),
                        request.describe_extra(),
                        error_chain(&e)
                    ),
                );
                DownloadOutcome::FailedGeneral
            }
        }
    }

    /// Metadata, destination and archive lookups; no filesystem writes
    async fn prepare(&self, request: &TrackRequest) -> Result<Prepared, PrepareError> {
        let meta = self.metadata.track_info(&request.id).await?;
        let song_name = format!(
            "{} - {}",
            sanitize_filename(meta.primary_artist()),
            sanitize_filename(&meta.title)
        );

        let path = self.paths.resolve(request.mode, &meta, &request.id, &request.extra);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.root().to_path_buf());

        let Some(reservation) = self.collisions.reserve(&dir, &meta.id) else {
            return Ok(Prepared {
                meta,
                song_name,
                slot: None,
                dir,
                known_locally: false,
                known_globally: false,
                name_has_content: false,
            });
        };

        let known_globally = self.archive.is_known(ArchiveScope::Global, &meta.id).await?;
        let (known_locally, path) = if self.archive.directories_disabled() {
            let known = !self.config.skip_existing || !self.config.skip_previously_downloaded;
            (known, path)
        } else {
            let archived = self
                .archive
                .entries(ArchiveScope::Directory(&dir))
                .await?
                .into_iter()
                .find(|entry| entry.id == meta.id);
            match archived {
                // A track keeps the name it was archived under; the templated
                // name may belong to a different track by now.
                Some(entry) if !entry.filename.is_empty() => (true, dir.join(entry.filename)),
                Some(_) => (true, path),
                None => (false, path),
            }
        };
        let name_has_content = has_content(&path);
        let claim = self.collisions.claim(&path, known_locally);

        debug!(
            "Prepared {} -> {} (local: {}, global: {}, exists: {})",
            meta.id,
            claim.path().display(),
            known_locally,
            known_globally,
            name_has_content
        );

        Ok(Prepared {
            meta,
            song_name,
            slot: Some(Slot {
                claim,
                _reservation: reservation,
            }),
            dir,
            known_locally,
            known_globally,
            name_has_content,
        })
    }

    /// Streaming through Recorded; returns the final path
    async fn acquire(
        &self,
        request: &TrackRequest,
        prepared: &Prepared,
        destination: &Path,
        chain: &RowChain,
    ) -> Result<PathBuf, DownloadError> {
        let config = &self.config;
        let meta = &prepared.meta;
        let final_path = destination.to_path_buf();
        let extension = config.download_format.extension();
        let premium = self.services.audio.is_premium();

        let quality = config.download_quality.resolve(premium);
        let mut stream = self.services.audio.open(&meta.id, quality).await?;

        tokio::fs::create_dir_all(&prepared.dir)
            .await
            .map_err(|e| DownloadError::io(&prepared.dir, e))?;

        let token = rand::random::<u64>();
        let (scratch, stem) = match &config.temp_download_dir {
            Some(dir) => (dir.clone(), format!("tunedl_{:016x}_{}", token, meta.id)),
            None => (prepared.dir.clone(), format!(".tunedl-{:016x}-{}", token, meta.id)),
        };
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| DownloadError::io(&scratch, e))?;
        let raw_path = scratch.join(format!("{}.part", stem));
        let converted_path = scratch.join(format!("{}.{}", stem, extension));

        let mut temps = TempFiles::new();
        temps.track(&raw_path);
        temps.track(&converted_path);

        let started = Instant::now();
        {
            let bar = self.display.enter(chain, Level::Download, stream.total_size());
            bar.set_message(prepared.song_name.clone());
            bar.refresh();

            let mut file = File::create(&raw_path)
                .await
                .map_err(|e| DownloadError::io(&raw_path, e))?;
            let options = StreamOptions {
                chunk_size: config.chunk_size,
                read_timeout: Duration::from_secs(config.read_timeout_secs),
                real_time: config.download_real_time,
                duration: Duration::from_millis(meta.duration_ms),
            };
            let written = stream_to_file(
                stream.as_mut(),
                &mut file,
                &raw_path,
                &options,
                &self.cancel,
                |n| bar.inc(n),
            )
            .await?;
            debug!("Streamed {} for {}", format_bytes(written), meta.id);
            bar.refresh();
        }
        let downloaded_in = started.elapsed();

        let genres = self.genres(meta).await;

        if config.download_lyrics {
            self.lyrics(meta, &prepared.dir, &prepared.song_name).await;
        }

        let bitrate = transcode_bitrate(
            config.download_format,
            &config.transcode_bitrate,
            config.download_quality,
            premium,
        );
        match self
            .services
            .converter
            .convert(&raw_path, &converted_path, config.download_format, bitrate.as_deref())
            .await
        {
            Ok(()) => {
                tokio::fs::remove_file(&raw_path)
                    .await
                    .map_err(|e| DownloadError::io(&raw_path, e))?;
            }
            Err(ConvertError::ToolMissing(tool)) => {
                debug!("Converter unavailable: {}", tool);
                self.display.print(
                    PrintChannel::Warnings,
                    &format!(
                        "###   SKIPPING {} CONVERSION - FFMPEG NOT FOUND   ###",
                        config.download_format.codec().to_uppercase()
                    )
                    .yellow()
                    .to_string(),
                );
                tokio::fs::rename(&raw_path, &converted_path)
                    .await
                    .map_err(|e| DownloadError::io(&converted_path, e))?;
            }
            Err(e) => return Err(e.into()),
        }

        let tags = TrackTags {
            artists: meta.artists.clone(),
            album_artist: meta.album_artist.clone(),
            title: meta.title.clone(),
            album: meta.album.clone(),
            genre: genres.join(&config.genre_delimiter),
            release_year: meta.release_year.clone(),
            disc_number: meta.disc_number,
            total_discs: request.extra.get("total_discs").and_then(|d| d.parse().ok()),
            track_number: meta.track_number,
            total_tracks: meta.total_tracks,
        };
        self.tag(&converted_path, tags, meta.cover_url.as_deref()).await;

        place_file(&converted_path, &final_path).await?;
        let finished_in = started.elapsed();

        let relative = final_path
            .strip_prefix(self.paths.root())
            .unwrap_or(&final_path)
            .display()
            .to_string();
        self.display.print(
            PrintChannel::Downloads,
            &format!(
                "###   DOWNLOADED: \"{}\" TO \"{}\" IN {} (PLUS {} CONVERTING)   ###\n",
                prepared.song_name,
                relative,
                format_elapsed(downloaded_in),
                format_elapsed(finished_in.saturating_sub(downloaded_in))
            )
            .green()
            .to_string(),
        );

        let filename = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let artist = meta.primary_artist();

        if (config.skip_previously_downloaded || config.disable_directory_archives)
            && !prepared.known_globally
        {
            self.archive
                .record(ArchiveScope::Global, &meta.id, &filename, artist, &meta.title)
                .await?;
        }
        if !prepared.known_locally {
            self.archive
                .record(
                    ArchiveScope::Directory(&prepared.dir),
                    &meta.id,
                    &filename,
                    artist,
                    &meta.title,
                )
                .await?;
        }

        Ok(final_path)
    }

    async fn genres(&self, meta: &TrackMetadata) -> Vec<String> {
        if !self.config.save_genres {
            return vec![String::new()];
        }
        match self.metadata.genres(meta, self.config.all_genres).await {
            Ok(genres) => {
                if genres.iter().all(String::is_empty) {
                    self.display.print(
                        PrintChannel::Warnings,
                        &format!("###   No genres found for song {}", meta.title),
                    );
                }
                genres
            }
            Err(e) => {
                warn!("Genre lookup failed for {}: {}", meta.id, e);
                vec![String::new()]
            }
        }
    }

    async fn lyrics(&self, meta: &TrackMetadata, audio_dir: &Path, song_name: &str) {
        let dir = self
            .config
            .lyrics_location
            .clone()
            .unwrap_or_else(|| audio_dir.to_path_buf());
        let unavailable = || {
            self.display.print(
                PrintChannel::Skips,
                &format!(
                    "###   SKIPPING: LYRICS FOR \"{}\" (LYRICS NOT AVAILABLE)   ###",
                    song_name
                )
                .yellow()
                .to_string(),
            )
        };

        let document = match self.services.lyrics.fetch(&meta.id).await {
            Ok(Some(document)) => document,
            Ok(None) => return unavailable(),
            Err(e) => {
                debug!("Lyrics lookup failed for {}: {}", meta.id, e);
                return unavailable();
            }
        };

        if self.config.lyrics_enhanced && matches!(document, LyricsDocument::Line { .. }) {
            self.display.print(
                PrintChannel::Warnings,
                &format!(
                    "###   ENHANCED LYRICS UNAVAILABLE FOR \"{}\", SAVING STANDARD LRC   ###",
                    song_name
                )
                .yellow()
                .to_string(),
            );
        }

        match write_lrc(
            &dir,
            meta.primary_artist(),
            &meta.title,
            &document,
            self.config.lyrics_enhanced,
        )
        .await
        {
            Ok(path) => {
                let kind = if document.is_time_synced() {
                    "time-synced"
                } else {
                    "non-time-synced"
                };
                debug!("Saved {} lyrics to {}", kind, path.display());
            }
            Err(e) => warn!("Could not save lyrics for {}: {}", song_name, e),
        }
    }

    /// Tag failures are reported but never fail the track
    async fn tag(&self, path: &Path, tags: TrackTags, cover_url: Option<&str>) {
        let cover = match cover_url {
            Some(url) => match self.services.catalog.fetch_bytes(url).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Cover art download failed: {}", e);
                    None
                }
            },
            None => None,
        };

        let target = path.to_path_buf();
        let result =
            tokio::task::spawn_blocking(move || write_tags(&target, &tags, cover.as_deref())).await;
        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };
        debug!("Tagging {} failed: {}", path.display(), failure);
        self.display.print(
            PrintChannel::Errors,
            &"Unable to write metadata, ensure FFMPEG is installed and added to your PATH."
                .red()
                .to_string(),
        );
    }

    async fn courtesy_wait(&self) {
        let wait = Duration::from_secs(self.config.bulk_wait_time);
        if wait.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }

    fn skip_banner(&self, song_name: &str, reason: &str) {
        self.display.print(
            PrintChannel::Skips,
            &format!("###   SKIPPING: \"{}\" ({})   ###\n", song_name, reason)
                .yellow()
                .to_string(),
        );
    }
}

/// Failures during Preparing
#[derive(Debug, thiserror::Error)]
enum PrepareError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Archive(#[from] crate::archive::ArchiveError),
}

/// Move the finished file into place, replacing any stale file there
async fn place_file(from: &Path, to: &Path) -> Result<(), DownloadError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    if tokio::fs::try_exists(to).await.unwrap_or(false) {
        tokio::fs::remove_file(to)
            .await
            .map_err(|e| DownloadError::io(to, e))?;
        if tokio::fs::rename(from, to).await.is_ok() {
            return Ok(());
        }
    }
    // Scratch directory on another filesystem
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| DownloadError::io(to, e))?;
    tokio::fs::remove_file(from)
        .await
        .map_err(|e| DownloadError::io(from, e))?;
    Ok(())
}

/// Error message followed by each `caused by` line
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    out
}
