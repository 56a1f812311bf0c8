//! The user's saved tracks and followed artists

use colored::Colorize;

use super::{Library, QueuedTrack, Summary};
use crate::catalog::models::{ArtistSummary, ListItem};
use crate::catalog::paging::{collect_next, collect_offset};
use crate::catalog::{ApiError, LinkKind};
use crate::download::{OutputMode, TrackRequest};
use crate::progress::{Level, PrintChannel, RowChain};

const SAVED_PAGE: usize = 50;

impl Library {
    /// Download the user's liked songs
    pub async fn liked(&self) -> Result<Summary, ApiError> {
        let items: Vec<ListItem> = collect_offset(self.api(), "me/tracks", SAVED_PAGE, &[]).await?;

        let mut queued = Vec::new();
        for track in items.into_iter().filter_map(|item| item.track) {
            match (track.id, track.name) {
                (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => {
                    queued.push(QueuedTrack {
                        label: name,
                        request: TrackRequest::new(id, OutputMode::Liked),
                    });
                }
                _ => self.display().print(
                    PrintChannel::Skips,
                    &"###   SKIPPING:  SONG DOES NOT EXIST ANYMORE   ###\n"
                        .yellow()
                        .to_string(),
                ),
            }
        }

        let bar = self
            .display()
            .enter(&RowChain::new(), Level::Playlist, queued.len() as u64);
        bar.set_message("Liked Songs");
        bar.refresh();
        Ok(self.run_tracks(queued, &bar).await)
    }

    /// Download the discography of every followed artist
    pub async fn followed(&self) -> Result<Summary, ApiError> {
        let params = [
            ("type", "artist".to_string()),
            ("limit", SAVED_PAGE.to_string()),
        ];
        let artists: Vec<ArtistSummary> =
            collect_next(self.api(), "me/following", &params, |mut v| {
                v.get_mut("artists")
                    .map(serde_json::Value::take)
                    .unwrap_or_default()
            })
            .await?;

        let bar = self
            .display()
            .enter(&RowChain::new(), Level::Url, artists.len() as u64);
        bar.refresh();

        let mut summary = Summary::default();
        for artist in artists {
            if self.downloader.is_cancelled() {
                break;
            }
            match self.artist(&artist.id, bar.chain()).await {
                Ok(s) => summary.merge(s),
                Err(e) => self.collection_failed(LinkKind::Artist, &artist.id, &e),
            }
            bar.inc(1);
            bar.set_message(artist.name);
            bar.refresh();
        }
        Ok(summary)
    }
}
