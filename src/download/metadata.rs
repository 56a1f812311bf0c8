//! Track metadata resolution

use std::sync::Arc;
use tracing::debug;

use super::error::MetadataError;
use crate::catalog::models::{ArtistDetails, ArtistRef, Image, Track, TracksResponse};
use crate::catalog::{decode, CatalogApi};

/// Canonical fields for one track, fetched fresh per download
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    /// Canonical id; may differ from the id that was requested
    pub id: String,
    pub artists: Vec<String>,
    pub artist_refs: Vec<ArtistRef>,
    pub album: String,
    pub album_artist: String,
    pub title: String,
    pub cover_url: Option<String>,
    pub release_year: String,
    pub disc_number: u32,
    pub track_number: u32,
    pub total_tracks: u32,
    pub is_playable: bool,
    pub duration_ms: u64,
}

impl TrackMetadata {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }

    fn from_track(track: Track) -> Self {
        let artists: Vec<String> = track.artists.iter().map(|a| a.name.clone()).collect();
        let album_artist = track
            .album
            .artists
            .first()
            .map(|a| a.name.clone())
            .or_else(|| artists.first().cloned())
            .unwrap_or_default();
        let release_year = track
            .album
            .release_date
            .split('-')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            id: track.id,
            cover_url: widest_image(&track.album.images).map(|i| i.url.clone()),
            artists,
            artist_refs: track.artists,
            album: track.album.name,
            album_artist,
            title: track.name,
            release_year,
            disc_number: track.disc_number,
            track_number: track.track_number,
            total_tracks: track.album.total_tracks,
            is_playable: track.is_playable,
            duration_ms: track.duration_ms,
        }
    }
}

/// Image with the greatest width; images without a width rank lowest
pub fn widest_image(images: &[Image]) -> Option<&Image> {
    images.iter().max_by_key(|i| i.width.unwrap_or(0))
}

/// Looks up track metadata and artist genres through the catalog API
#[derive(Clone)]
pub struct MetadataResolver {
    api: Arc<dyn CatalogApi>,
}

impl MetadataResolver {
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self { api }
    }

    /// Fetch the canonical metadata for one track id
    pub async fn track_info(&self, id: &str) -> Result<TrackMetadata, MetadataError> {
        let url = format!("tracks?ids={}&market=from_token", urlencoding::encode(id));
        debug!("Resolving metadata for {}", id);

        let (_, value) = self.api.fetch(&url).await?;
        let response: TracksResponse = decode(&url, value)?;

        let track = response
            .tracks
            .and_then(|tracks| tracks.into_iter().next().flatten())
            .ok_or_else(|| MetadataError::MissingTrack(id.to_string()))?;

        Ok(TrackMetadata::from_track(track))
    }

    /// Genres of the track's artists
    ///
    /// Takes the first genre of each artist, or every genre when `all` is set.
    /// Yields a single empty string when no artist has any genre.
    pub async fn genres(
        &self,
        meta: &TrackMetadata,
        all: bool,
    ) -> Result<Vec<String>, MetadataError> {
        let mut genres = Vec::new();
        for artist in &meta.artist_refs {
            let url = match (&artist.href, &artist.id) {
                (Some(href), _) => href.clone(),
                (None, Some(id)) => format!("artists/{}", id),
                (None, None) => continue,
            };
            let (_, value) = self.api.fetch(&url).await.map_err(MetadataError::Genres)?;
            let details: ArtistDetails = decode(&url, value).map_err(MetadataError::Genres)?;

            if all {
                genres.extend(details.genres);
            } else if let Some(first) = details.genres.into_iter().next() {
                genres.push(first);
            }
        }

        if genres.is_empty() {
            genres.push(String::new());
        }
        Ok(genres)
    }
}
