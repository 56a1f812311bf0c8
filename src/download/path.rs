//! Output path templating and filename collision handling

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::metadata::TrackMetadata;
use crate::config::Config;
use crate::utils::sanitize_filename;

/// Which kind of traversal requested the track; selects the default template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Single,
    Album,
    Playlist,
    ExtPlaylist,
    Liked,
}

/// Caller-supplied template variables (album position, playlist name, ...)
pub type ExtraKeys = BTreeMap<String, String>;

/// Expands output templates into concrete destination paths
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    output: String,
    single: String,
    album: String,
    playlist: String,
    extplaylist: String,
    liked: String,
    split_discs: bool,
    extension: &'static str,
}

impl PathResolver {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.root_path.clone(),
            output: config.output.clone(),
            single: config.output_single.clone(),
            album: config.output_album.clone(),
            playlist: config.output_playlist.clone(),
            extplaylist: config.output_extplaylist.clone(),
            liked: config.output_liked.clone(),
            split_discs: config.split_album_discs,
            extension: config.download_format.extension(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Template in effect for `mode`; a non-empty global template wins
    pub fn template_for(&self, mode: OutputMode) -> String {
        if !self.output.is_empty() {
            return self.output.clone();
        }
        let template = match mode {
            OutputMode::Single => &self.single,
            OutputMode::Album => &self.album,
            OutputMode::Playlist => &self.playlist,
            OutputMode::ExtPlaylist => &self.extplaylist,
            OutputMode::Liked => &self.liked,
        };
        template.clone()
    }

    /// Root-relative path for a track
    ///
    /// `requested_id` fills `{track_id}`; `{id}` is always the canonical id.
    pub fn relative_path(
        &self,
        mode: OutputMode,
        meta: &TrackMetadata,
        requested_id: &str,
        extra: &ExtraKeys,
    ) -> PathBuf {
        let mut template = self.template_for(mode);
        if self.split_discs {
            template = insert_disc_segment(&template);
        }
        PathBuf::from(expand(&template, |key| {
            if let Some(value) = extra.get(key) {
                return Some(value.clone());
            }
            builtin(key, meta, requested_id, self.extension)
        }))
    }

    /// Absolute destination for a track
    pub fn resolve(
        &self,
        mode: OutputMode,
        meta: &TrackMetadata,
        requested_id: &str,
        extra: &ExtraKeys,
    ) -> PathBuf {
        self.root.join(self.relative_path(mode, meta, requested_id, extra))
    }
}

fn builtin(key: &str, meta: &TrackMetadata, requested_id: &str, ext: &str) -> Option<String> {
    let value = match key {
        "artist" => meta.primary_artist().to_string(),
        "album_artist" => meta.album_artist.clone(),
        "album" => meta.album.clone(),
        "song_name" => meta.title.clone(),
        "release_year" => meta.release_year.clone(),
        "disc_number" => meta.disc_number.to_string(),
        "track_number" => meta.track_number.to_string(),
        "total_tracks" => meta.total_tracks.to_string(),
        "id" => meta.id.clone(),
        "track_id" => requested_id.to_string(),
        "ext" => ext.to_string(),
        _ => return None,
    };
    Some(value)
}

/// `a/b/file.ext` becomes `a/b/Disc {disc_number}/file.ext`
fn insert_disc_segment(template: &str) -> String {
    match template.rsplit_once('/') {
        Some((dirs, file)) => format!("{}/Disc {{disc_number}}/{}", dirs, file),
        None => format!("Disc {{disc_number}}/{}", template),
    }
}

/// Single-pass placeholder expansion
///
/// Each `{key}` is replaced by the sanitized lookup result. Unknown keys expand
/// to nothing. Substituted values are never rescanned, so braces inside titles
/// survive intact.
fn expand<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        if key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !key.is_empty() {
            match lookup(key) {
                Some(value) => out.push_str(&sanitize_filename(&value)),
                None => warn!("Unknown output template key {{{}}}", key),
            }
        } else {
            out.push('{');
            out.push_str(key);
            out.push('}');
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Destinations and track ids held by in-flight downloads
#[derive(Debug, Default)]
struct Claims {
    paths: HashSet<PathBuf>,
    tracks: HashSet<(PathBuf, String)>,
}

type SharedClaims = Arc<Mutex<Claims>>;

fn lock(claims: &SharedClaims) -> MutexGuard<'_, Claims> {
    claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process set of destination paths claimed by in-flight downloads
///
/// Counting same-stem files and claiming the chosen name happen under one lock,
/// so two concurrent tracks that template to the same name get distinct files.
/// A track id is reserved per directory before its archive is read, so the
/// same track is never in flight twice in one directory.
#[derive(Debug, Clone, Default)]
pub struct CollisionRegistry {
    claims: SharedClaims,
}

/// A reserved track id in a directory; released on drop
#[derive(Debug)]
pub struct TrackReservation {
    key: (PathBuf, String),
    claims: SharedClaims,
}

impl Drop for TrackReservation {
    fn drop(&mut self) {
        lock(&self.claims).tracks.remove(&self.key);
    }
}

/// A claimed destination; released on drop
#[derive(Debug)]
pub struct PathClaim {
    path: PathBuf,
    claims: SharedClaims,
}

impl PathClaim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        lock(&self.claims).paths.remove(&self.path);
    }
}

/// File exists and is non-empty
pub fn has_content(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

impl CollisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve track `id` in `dir`; `None` while another download holds it
    pub fn reserve(&self, dir: &Path, id: &str) -> Option<TrackReservation> {
        let key = (dir.to_path_buf(), id.to_string());
        if !lock(&self.claims).tracks.insert(key.clone()) {
            debug!("{} is already in flight in {}", id, dir.display());
            return None;
        }
        Some(TrackReservation {
            key,
            claims: self.claims.clone(),
        })
    }

    /// Claim `path`, or a suffixed sibling if the name belongs to another track
    ///
    /// When `known_locally` is false and `path` is taken (a non-empty file or
    /// another in-flight claim), the stem gets `_{n}` where `n` counts the
    /// same-stem entries already in the directory.
    pub fn claim(&self, path: &Path, known_locally: bool) -> PathClaim {
        let mut claims = lock(&self.claims);

        let mut chosen = path.to_path_buf();
        if !known_locally && (has_content(path) || claims.paths.contains(path)) {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let suffix = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();

            let mut count = same_stem_count(dir, &stem, &claims.paths);
            loop {
                let candidate = dir.join(format!("{}_{}{}", stem, count, suffix));
                if !candidate.exists() && !claims.paths.contains(&candidate) {
                    chosen = candidate;
                    break;
                }
                count += 1;
            }
            debug!("{} is taken, using {}", path.display(), chosen.display());
        }

        claims.paths.insert(chosen.clone());
        PathClaim {
            path: chosen,
            claims: self.claims.clone(),
        }
    }
}

fn same_stem_count(dir: &Path, stem: &str, claimed: &HashSet<PathBuf>) -> usize {
    let on_disk: HashSet<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| name_starts_with(p, stem))
                .collect()
        })
        .unwrap_or_default();
    let in_flight = claimed
        .iter()
        .filter(|p| p.parent() == Some(dir) && name_starts_with(p, stem) && !on_disk.contains(*p))
        .count();
    on_disk.len() + in_flight
}

fn name_starts_with(path: &Path, stem: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(stem))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DENYLIST;
    use tempfile::TempDir;

    fn meta(artist: &str, title: &str, album: &str) -> TrackMetadata {
        TrackMetadata {
            id: "abc123".into(),
            artists: vec![artist.into()],
            artist_refs: Vec::new(),
            album: album.into(),
            album_artist: artist.into(),
            title: title.into(),
            cover_url: None,
            release_year: "2019".into(),
            disc_number: 2,
            track_number: 3,
            total_tracks: 12,
            is_playable: true,
            duration_ms: 1000,
        }
    }

    fn resolver() -> PathResolver {
        let config = Config {
            root_path: PathBuf::from("/music"),
            ..Config::default()
        };
        PathResolver::from_config(&config)
    }

    #[test]
    fn test_single_default_template() {
        let path = resolver().relative_path(
            OutputMode::Single,
            &meta("Artist A", "Song B", "Album C"),
            "abc123",
            &ExtraKeys::new(),
        );
        assert_eq!(path, PathBuf::from("Artist A/Album C/Artist A - Song B.ogg"));
    }

    #[test]
    fn test_album_template_with_extra_keys() {
        let mut extra = ExtraKeys::new();
        extra.insert("album_num".into(), "03".into());
        let path = resolver().resolve(
            OutputMode::Album,
            &meta("Artist A", "Song B", "Album C"),
            "abc123",
            &extra,
        );
        assert_eq!(
            path,
            PathBuf::from("/music/Artist A/Album C/03 - Artist A - Song B.ogg")
        );
    }

    #[test]
    fn test_extra_keys_take_precedence() {
        let mut extra = ExtraKeys::new();
        extra.insert("artist".into(), "Playlist Artist".into());
        let path = resolver().relative_path(
            OutputMode::Single,
            &meta("Artist A", "Song B", "Album C"),
            "abc123",
            &extra,
        );
        assert!(path.starts_with("Playlist Artist"));
    }

    #[test]
    fn test_global_output_overrides_mode() {
        let config = Config {
            output: "{id}-{track_id}.{ext}".into(),
            ..Config::default()
        };
        let path = PathResolver::from_config(&config).relative_path(
            OutputMode::Album,
            &meta("A", "B", "C"),
            "requested",
            &ExtraKeys::new(),
        );
        assert_eq!(path, PathBuf::from("abc123-requested.ogg"));
    }

    #[test]
    fn test_values_are_sanitized() {
        let path = resolver().relative_path(
            OutputMode::Single,
            &meta("AC/DC", "What? <Live>", "Back: In|Black"),
            "abc123",
            &ExtraKeys::new(),
        );
        let components: Vec<_> = path.components().collect();
        assert_eq!(components.len(), 3);
        for component in components {
            let text = component.as_os_str().to_string_lossy();
            assert!(!text.contains(|c| DENYLIST.contains(&c)), "{}", text);
        }
    }

    #[test]
    fn test_no_placeholder_left_behind() {
        let config = Config {
            output: "{artist}/{nonsense}{song_name} {{x}.{ext}".into(),
            ..Config::default()
        };
        let path = PathResolver::from_config(&config).relative_path(
            OutputMode::Single,
            &meta("A", "T {Live}", "C"),
            "abc123",
            &ExtraKeys::new(),
        );
        let text = path.to_string_lossy().into_owned();
        assert!(!text.contains("{nonsense}"));
        assert!(!text.contains("{ext}"));
        assert!(text.contains("T {Live}"));
    }

    #[test]
    fn test_disc_split_inserts_segment() {
        let config = Config {
            split_album_discs: true,
            ..Config::default()
        };
        let path = PathResolver::from_config(&config).relative_path(
            OutputMode::Single,
            &meta("A", "B", "C"),
            "abc123",
            &ExtraKeys::new(),
        );
        assert_eq!(path, PathBuf::from("A/C/Disc 2/A - B.ogg"));
    }

    #[test]
    fn test_claim_free_name() {
        let tmp = TempDir::new().unwrap();
        let registry = CollisionRegistry::new();
        let target = tmp.path().join("X.ogg");
        let claim = registry.claim(&target, false);
        assert_eq!(claim.path(), target);
    }

    #[test]
    fn test_claim_existing_file_gets_suffix() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("X.ogg");
        std::fs::write(&target, b"other track").unwrap();

        let registry = CollisionRegistry::new();
        let first = registry.claim(&target, false);
        assert_eq!(first.path(), tmp.path().join("X_1.ogg"));

        let second = registry.claim(&target, false);
        assert_eq!(second.path(), tmp.path().join("X_2.ogg"));
    }

    #[test]
    fn test_known_locally_keeps_name() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("X.ogg");
        std::fs::write(&target, b"same track").unwrap();

        let claim = CollisionRegistry::new().claim(&target, true);
        assert_eq!(claim.path(), target);
    }

    #[test]
    fn test_empty_file_is_not_a_collision() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("X.ogg");
        std::fs::write(&target, b"").unwrap();

        let claim = CollisionRegistry::new().claim(&target, false);
        assert_eq!(claim.path(), target);
    }

    #[test]
    fn test_in_flight_claims_collide_and_release() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("X.ogg");
        let registry = CollisionRegistry::new();

        let first = registry.claim(&target, false);
        let second = registry.claim(&target, false);
        assert_eq!(first.path(), target);
        assert_eq!(second.path(), tmp.path().join("X_1.ogg"));

        drop(first);
        drop(second);
        let third = registry.claim(&target, false);
        assert_eq!(third.path(), target);
    }

    #[test]
    fn test_track_reserved_once_per_directory() {
        let tmp = TempDir::new().unwrap();
        let registry = CollisionRegistry::new();

        let first = registry.reserve(tmp.path(), "id1").unwrap();
        assert!(registry.reserve(tmp.path(), "id1").is_none());
        assert!(registry.reserve(tmp.path(), "id2").is_some());
        assert!(registry.reserve(&tmp.path().join("other"), "id1").is_some());

        drop(first);
        assert!(registry.reserve(tmp.path(), "id1").is_some());
    }
}
