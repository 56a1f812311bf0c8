//! Catalog API response models
//!
//! Every response shape the pipeline reads has a strict schema here, so a
//! mismatched payload fails at decode time instead of deep in business logic.

use serde::{Deserialize, Serialize};

// Track lookup response (tracks?ids=...)
#[derive(Debug, Clone, Deserialize)]
pub struct TracksResponse {
    pub tracks: Option<Vec<Option<Track>>>,
}

/// Full track object
#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub album: TrackAlbum,
    pub disc_number: u32,
    pub track_number: u32,
    pub is_playable: bool,
    pub duration_ms: u64,
}

/// Artist reference embedded in track and album objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
    /// API link to the artist's detail document
    pub href: Option<String>,
}

/// Album as embedded in a track object
#[derive(Debug, Clone, Deserialize)]
pub struct TrackAlbum {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub release_date: String,
    pub total_tracks: u32,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
}

// Artist detail response (artists/{id})
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistDetails {
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Offset-paged collection
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

// Album detail response (albums/{id})
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumDetails {
    pub name: String,
    pub artists: Vec<ArtistRef>,
}

/// Track entry of an album track listing
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumTrack {
    pub id: Option<String>,
    pub name: String,
    pub disc_number: Option<u32>,
}

/// Album entry of an artist discography
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumSummary {
    pub id: String,
    pub name: String,
}

/// Item wrapper used by playlist and saved-track listings
#[derive(Debug, Clone, Deserialize)]
pub struct ListItem {
    pub track: Option<ItemTrack>,
}

/// Loosely populated track inside a listing (removed tracks have null fields)
#[derive(Debug, Clone, Deserialize)]
pub struct ItemTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type", default = "default_item_type")]
    pub kind: String,
}

fn default_item_type() -> String {
    "track".to_string()
}

impl ItemTrack {
    pub fn is_episode(&self) -> bool {
        self.kind == "episode"
    }
}

// Playlist info (playlists/{id}?fields=name,owner(display_name))
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
}

/// Playlist entry of the user's playlist listing
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

/// Artist entry of the followed-artists listing (`me/following?type=artist`,
/// where the page is nested under `artists`)
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
}

// Current user (me)
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
    pub product: Option<String>,
}

impl CurrentUser {
    pub fn is_premium(&self) -> bool {
        self.product.as_deref() == Some("premium")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_decodes() {
        let value = json!({
            "id": "abc123",
            "name": "Song B",
            "artists": [{ "id": "a1", "name": "Artist A", "href": "https://api/artists/a1" }],
            "album": {
                "name": "Album C",
                "artists": [{ "name": "Artist A" }],
                "release_date": "2019-04-01",
                "total_tracks": 12,
                "images": [{ "url": "https://img/640", "width": 640, "height": 640 }]
            },
            "disc_number": 1,
            "track_number": 3,
            "is_playable": true,
            "duration_ms": 215000
        });
        let track: Track = serde_json::from_value(value).unwrap();
        assert_eq!(track.album.total_tracks, 12);
        assert_eq!(track.artists[0].href.as_deref(), Some("https://api/artists/a1"));
    }

    #[test]
    fn test_track_missing_field_fails() {
        let value = json!({ "id": "abc123", "name": "Song B" });
        assert!(serde_json::from_value::<Track>(value).is_err());
    }

    #[test]
    fn test_list_item_with_removed_track() {
        let value = json!({
            "items": [{ "track": null }, { "track": { "id": null, "name": "" } }],
            "next": null
        });
        let page: Page<ListItem> = serde_json::from_value(value).unwrap();
        assert!(page.items[0].track.is_none());
        assert_eq!(page.items[1].track.as_ref().unwrap().kind, "track");
    }
}
