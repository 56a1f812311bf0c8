//! Albums and artist discographies

use tracing::debug;

use super::{Library, QueuedTrack, Summary};
use crate::catalog::models::{AlbumDetails, AlbumSummary, AlbumTrack};
use crate::catalog::paging::{collect_next, collect_offset};
use crate::catalog::{decode, ApiError, LinkKind};
use crate::download::{ExtraKeys, OutputMode, TrackRequest};
use crate::progress::{Level, RowChain};
use crate::utils::pad_position;

const ALBUM_PAGE: usize = 50;

impl Library {
    /// Download every track of an album in album mode
    pub async fn album(&self, id: &str, parent: &RowChain) -> Result<Summary, ApiError> {
        let url = format!("albums/{}", id);
        let (_, value) = self.api().fetch(&url).await?;
        let details: AlbumDetails = decode(&url, value)?;
        let artist = details
            .artists
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_default();

        let tracks: Vec<AlbumTrack> =
            collect_offset(self.api(), &format!("albums/{}/tracks", id), ALBUM_PAGE, &[]).await?;
        let total = tracks.len();
        let total_discs = tracks.iter().filter_map(|t| t.disc_number).max();
        debug!("Album {} ({}): {} tracks", details.name, id, total);

        let queued = tracks
            .into_iter()
            .enumerate()
            .filter_map(|(index, track)| {
                let track_id = track.id?;
                let mut extra = ExtraKeys::new();
                extra.insert("album_num".into(), pad_position(index + 1, total));
                extra.insert("artist".into(), artist.clone());
                extra.insert("album".into(), details.name.clone());
                extra.insert("album_id".into(), id.to_string());
                if let Some(discs) = total_discs {
                    extra.insert("total_discs".into(), discs.to_string());
                }
                Some(QueuedTrack {
                    label: track.name,
                    request: TrackRequest::new(track_id, OutputMode::Album).with_extra(extra),
                })
            })
            .collect();

        let bar = self.display().enter(parent, Level::Album, total as u64);
        bar.set_message(details.name.clone());
        bar.refresh();
        Ok(self.run_tracks(queued, &bar).await)
    }

    /// Download every album and single of an artist
    ///
    /// An album that fails to load is reported and the rest continue.
    pub async fn artist(&self, id: &str, parent: &RowChain) -> Result<Summary, ApiError> {
        let params = [
            ("include_groups", "album,single".to_string()),
            ("limit", ALBUM_PAGE.to_string()),
        ];
        let albums: Vec<AlbumSummary> =
            collect_next(self.api(), &format!("artists/{}/albums", id), &params, |v| v).await?;

        let bar = self.display().enter(parent, Level::Artist, albums.len() as u64);
        bar.refresh();

        let mut summary = Summary::default();
        for album in albums {
            if self.downloader.is_cancelled() {
                break;
            }
            match self.album(&album.id, bar.chain()).await {
                Ok(s) => summary.merge(s),
                Err(e) => self.collection_failed(LinkKind::Album, &album.id, &e),
            }
            bar.inc(1);
            bar.set_message(album.name);
            bar.refresh();
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{downloader, test_config, track_json, StubCatalog};
    use serde_json::json;
    use tempfile::TempDir;

    fn album_catalog() -> StubCatalog {
        StubCatalog::new()
            .with_response(
                "albums/alb1",
                json!({
                    "id": "alb1",
                    "name": "Album C",
                    "artists": [{ "id": "artist-a", "name": "Artist A" }],
                    "total_tracks": 2
                }),
            )
            .with_response(
                "albums/alb1/tracks?limit=50&offset=0",
                json!({
                    "items": [
                        { "id": "t1", "name": "Song B", "disc_number": 1 },
                        { "id": "t2", "name": "Song D", "disc_number": 2 }
                    ],
                    "next": null
                }),
            )
            .with_track(track_json("t1", "Artist A", "Song B", "Album C"))
            .with_track(track_json("t2", "Artist A", "Song D", "Album C"))
    }

    #[tokio::test]
    async fn test_album_tracks_numbered_in_listing_order() {
        let tmp = TempDir::new().unwrap();
        let library = Library::new(downloader(test_config(tmp.path()), album_catalog()));

        let summary = library.album("alb1", &RowChain::new()).await.unwrap();

        assert_eq!(summary.completed, 2);
        let dir = tmp.path().join("library/Artist A/Album C");
        assert!(dir.join("01 - Artist A - Song B.ogg").is_file());
        assert!(dir.join("02 - Artist A - Song D.ogg").is_file());
    }

    #[tokio::test]
    async fn test_album_runs_in_parallel() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.parallel = 4;
        let library = Library::new(downloader(config, album_catalog()));

        let summary = library.album("alb1", &RowChain::new()).await.unwrap();
        assert_eq!(summary.completed, 2);
    }

    #[tokio::test]
    async fn test_missing_album_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let library = Library::new(downloader(test_config(tmp.path()), StubCatalog::new()));
        assert!(library.album("nope", &RowChain::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_artist_follows_next_links() {
        let tmp = TempDir::new().unwrap();
        let catalog = album_catalog()
            .with_response(
                "artists/artist-a/albums?include_groups=album,single&limit=50",
                json!({
                    "items": [{ "id": "alb1", "name": "Album C" }],
                    "next": "https://api.example/artists/artist-a/albums?offset=1"
                }),
            )
            .with_response(
                "https://api.example/artists/artist-a/albums?offset=1",
                json!({ "items": [{ "id": "alb-missing", "name": "Gone" }], "next": null }),
            );
        let library = Library::new(downloader(test_config(tmp.path()), catalog));

        let summary = library.artist("artist-a", &RowChain::new()).await.unwrap();
        assert_eq!(summary.completed, 2);
    }
}
