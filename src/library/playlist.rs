//! Playlists, by link or from the user's own listing

use colored::Colorize;

use super::{Library, QueuedTrack, Summary};
use crate::catalog::models::{ListItem, PlaylistInfo, PlaylistSummary};
use crate::catalog::paging::collect_offset;
use crate::catalog::{decode, ApiError, LinkKind};
use crate::download::{ExtraKeys, OutputMode, TrackRequest};
use crate::progress::{Level, PrintChannel, RowChain};
use crate::utils::pad_position;

const PLAYLIST_PAGE: usize = 100;
const USER_PLAYLIST_PAGE: usize = 50;

impl Library {
    /// Look up a playlist's name, then download it
    pub async fn playlist(&self, id: &str, parent: &RowChain) -> Result<Summary, ApiError> {
        let url = format!(
            "playlists/{}?fields=name,owner(display_name)&market=from_token",
            id
        );
        let (_, value) = self.api().fetch(&url).await?;
        let info: PlaylistInfo = decode(&url, value)?;
        self.named_playlist(id, info.name.trim(), OutputMode::ExtPlaylist, parent)
            .await
    }

    /// Download a playlist whose name is already known
    ///
    /// Removed entries (null ids) are dropped before numbering. Episodes are
    /// reported and skipped.
    pub async fn named_playlist(
        &self,
        id: &str,
        name: &str,
        mode: OutputMode,
        parent: &RowChain,
    ) -> Result<Summary, ApiError> {
        let items: Vec<ListItem> = collect_offset(
            self.api(),
            &format!("playlists/{}/tracks", id),
            PLAYLIST_PAGE,
            &[],
        )
        .await?;
        let entries: Vec<_> = items
            .into_iter()
            .filter_map(|item| item.track)
            .filter(|track| track.id.is_some())
            .collect();
        let total = entries.len();

        let mut queued = Vec::new();
        for (index, track) in entries.into_iter().enumerate() {
            let track_name = track.name.clone().unwrap_or_default();
            let Some(track_id) = track.id.clone() else {
                continue;
            };
            if track.is_episode() {
                self.display().print(
                    PrintChannel::Skips,
                    &format!(
                        "###   SKIPPING: EPISODE \"{}\" (PODCASTS ARE NOT SUPPORTED)   ###\n",
                        track_name
                    )
                    .yellow()
                    .to_string(),
                );
                continue;
            }

            let mut extra = ExtraKeys::new();
            extra.insert("playlist_song_name".into(), track_name.clone());
            extra.insert("playlist".into(), name.to_string());
            extra.insert("playlist_num".into(), pad_position(index + 1, total));
            extra.insert("playlist_id".into(), id.to_string());
            extra.insert("playlist_track_id".into(), track_id.clone());
            queued.push(QueuedTrack {
                label: track_name,
                request: TrackRequest::new(track_id, mode).with_extra(extra),
            });
        }

        let bar = self.display().enter(parent, Level::Playlist, queued.len() as u64);
        bar.set_message(name.to_string());
        bar.refresh();
        Ok(self.run_tracks(queued, &bar).await)
    }

    /// Playlists owned or followed by the current user
    pub async fn user_playlists(&self) -> Result<Vec<PlaylistSummary>, ApiError> {
        collect_offset(self.api(), "me/playlists", USER_PLAYLIST_PAGE, &[]).await
    }

    /// Download each of the user's `playlists` in turn under one `urls` bar
    ///
    /// These use the `playlist` template rather than the one for linked playlists.
    pub async fn playlists(&self, playlists: &[PlaylistSummary]) -> Summary {
        let bar = self
            .display()
            .enter(&RowChain::new(), Level::Url, playlists.len() as u64);
        let mut summary = Summary::default();
        for playlist in playlists {
            if self.downloader.is_cancelled() {
                break;
            }
            self.display().print(
                PrintChannel::ProgressInfo,
                &format!("Downloading {}", playlist.name.trim()),
            );
            match self
                .named_playlist(
                    &playlist.id,
                    playlist.name.trim(),
                    OutputMode::Playlist,
                    bar.chain(),
                )
                .await
            {
                Ok(s) => summary.merge(s),
                Err(e) => self.collection_failed(LinkKind::Playlist, &playlist.id, &e),
            }
            bar.inc(1);
            bar.refresh();
        }
        summary
    }
}
