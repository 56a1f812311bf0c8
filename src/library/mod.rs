//! Collection traversal: albums, artists, playlists, saved tracks, links
//!
//! Each traversal opens a bar for its level below the caller's row chain, hands
//! the extended chain to the level beneath it, and refreshes the chain after
//! every unit of work. Tracks inside one collection are downloaded up to
//! `parallel` at a time.

mod album;
mod playlist;
mod saved;

use colored::Colorize;
use futures::stream::{self, StreamExt};
use std::fmt;
use tracing::{debug, info};

use crate::catalog::{ApiError, CatalogApi, CatalogLink, LinkKind};
use crate::download::{DownloadOutcome, OutputMode, TrackDownloader, TrackRequest};
use crate::progress::{Level, LevelBar, PrintChannel, ProgressDisplay, RowChain};

/// Tally of track outcomes for a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Completed(_) => self.completed += 1,
            DownloadOutcome::SkippedUnavailable
            | DownloadOutcome::SkippedExists
            | DownloadOutcome::SkippedAlreadyDownloaded => self.skipped += 1,
            DownloadOutcome::FailedMetadata | DownloadOutcome::FailedGeneral => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: Summary) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )
    }
}

/// A track queued by a traversal, with the name shown on its parent's bar
struct QueuedTrack {
    label: String,
    request: TrackRequest,
}

/// Walks catalog collections and feeds their tracks to the downloader
pub struct Library {
    downloader: TrackDownloader,
}

impl Library {
    pub fn new(downloader: TrackDownloader) -> Self {
        Self { downloader }
    }

    fn api(&self) -> &dyn CatalogApi {
        self.downloader.catalog().as_ref()
    }

    fn display(&self) -> &ProgressDisplay {
        self.downloader.display()
    }

    /// Download one track as a single
    pub async fn track(&self, id: &str, parent: &RowChain) -> Summary {
        let mut summary = Summary::default();
        let outcome = self
            .downloader
            .download(&TrackRequest::new(id, OutputMode::Single), parent)
            .await;
        summary.record(&outcome);
        summary
    }

    /// Dispatch every link in order under one `urls` bar
    pub async fn links(&self, links: &[CatalogLink]) -> Summary {
        let mut summary = Summary::default();
        let bar = self
            .display()
            .enter(&RowChain::new(), Level::Url, links.len() as u64);

        for (index, link) in links.iter().enumerate() {
            if self.downloader.is_cancelled() {
                info!("Cancelled, {} links not processed", links.len() - index);
                break;
            }
            debug!("Dispatching {} {}", link.kind, link.id);
            let result = match link.kind {
                LinkKind::Track => Ok(self.track(&link.id, bar.chain()).await),
                LinkKind::Album => self.album(&link.id, bar.chain()).await,
                LinkKind::Artist => self.artist(&link.id, bar.chain()).await,
                LinkKind::Playlist => self.playlist(&link.id, bar.chain()).await,
                LinkKind::Episode | LinkKind::Show => {
                    self.display().print(
                        PrintChannel::Skips,
                        &format!(
                            "###   SKIPPING: {} {} (PODCASTS ARE NOT SUPPORTED)   ###\n",
                            link.kind.as_str().to_uppercase(),
                            link.id
                        )
                        .yellow()
                        .to_string(),
                    );
                    Ok(Summary::default())
                }
            };
            match result {
                Ok(s) => summary.merge(s),
                Err(e) => self.collection_failed(link.kind, &link.id, &e),
            }
            bar.inc(1);
            bar.refresh();
        }
        summary
    }

    fn collection_failed(&self, kind: LinkKind, id: &str, error: &ApiError) {
        self.display().print(
            PrintChannel::Errors,
            &format!(
                "###   SKIPPING {} - FAILED TO QUERY CATALOG - ID: {}   ###\n{}\n",
                kind.as_str().to_uppercase(),
                id,
                crate::download::error_chain(error)
            )
            .red()
            .to_string(),
        );
    }

    /// Download `tracks` under `bar`, advancing it once per finished track
    async fn run_tracks(&self, tracks: Vec<QueuedTrack>, bar: &LevelBar) -> Summary {
        let parallel = self.downloader.config().parallel.max(1);
        let chain = bar.chain().clone();

        let mut results = stream::iter(tracks)
            .map(|queued| {
                let downloader = self.downloader.clone();
                let chain = chain.clone();
                async move {
                    if downloader.is_cancelled() {
                        return None;
                    }
                    let outcome = downloader.download(&queued.request, &chain).await;
                    Some((queued.label, outcome))
                }
            })
            .buffer_unordered(parallel);

        let mut summary = Summary::default();
        while let Some(result) = results.next().await {
            let Some((label, outcome)) = result else {
                continue;
            };
            summary.record(&outcome);
            bar.inc(1);
            bar.set_message(label);
            bar.refresh();
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{downloader, test_config, track_json, StubCatalog};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn link(kind: LinkKind, id: &str) -> CatalogLink {
        CatalogLink {
            kind,
            id: id.to_string(),
        }
    }

    fn tally(completed: usize, skipped: usize, failed: usize) -> Summary {
        Summary {
            completed,
            skipped,
            failed,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = Summary::default();
        summary.record(&DownloadOutcome::Completed(PathBuf::from("a.ogg")));
        summary.record(&DownloadOutcome::SkippedExists);
        summary.record(&DownloadOutcome::FailedGeneral);
        summary.record(&DownloadOutcome::FailedMetadata);
        assert_eq!(summary, tally(1, 1, 2));
        assert_eq!(summary.to_string(), "1 downloaded, 1 skipped, 2 failed");
    }

    #[tokio::test]
    async fn test_links_dispatch_tracks_and_skip_podcasts() {
        let tmp = TempDir::new().unwrap();
        let catalog = StubCatalog::new()
            .with_track(track_json("t1", "Artist A", "Song B", "Album C"))
            .with_track(track_json("t2", "Artist A", "Song D", "Album C"));
        let library = Library::new(downloader(test_config(tmp.path()), catalog));

        let links = vec![
            link(LinkKind::Track, "t1"),
            link(LinkKind::Episode, "e1"),
            link(LinkKind::Track, "t2"),
        ];
        let summary = library.links(&links).await;

        assert_eq!(summary.completed, 2);
        assert!(tmp.path().join("library/Artist A/Album C/Artist A - Song D.ogg").is_file());
    }

    #[tokio::test]
    async fn test_failed_collection_does_not_stop_later_links() {
        let tmp = TempDir::new().unwrap();
        let catalog =
            StubCatalog::new().with_track(track_json("t1", "Artist A", "Song B", "Album C"));
        let library = Library::new(downloader(test_config(tmp.path()), catalog));

        let links = vec![
            link(LinkKind::Album, "gone"),
            link(LinkKind::Track, "t1"),
        ];
        let summary = library.links(&links).await;
        assert_eq!(summary, tally(1, 0, 0));
    }
}
