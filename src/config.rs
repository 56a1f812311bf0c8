//! Configuration persistence
//!
//! Settings live in ~/.config/tunedl/config.json and are created with defaults on
//! first run. The loaded `Config` is passed explicitly into every component; there
//! is no global settings holder.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const FFMPEG_LOG_LEVELS: &[&str] = &[
    "trace", "verbose", "info", "warning", "error", "fatal", "panic", "quiet",
];

/// Target container/codec for downloaded tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Aac,
    FdkAac,
    M4a,
    Mp3,
    Ogg,
    Opus,
    Vorbis,
}

impl AudioFormat {
    /// Encoder name passed to the converter (`copy` keeps the stream as delivered)
    pub fn codec(self) -> &'static str {
        match self {
            Self::Aac | Self::M4a => "aac",
            Self::FdkAac => "libfdk_aac",
            Self::Mp3 => "libmp3lame",
            Self::Opus => "libopus",
            Self::Ogg | Self::Vorbis => "copy",
        }
    }

    /// File extension of the produced container
    pub fn extension(self) -> &'static str {
        match self {
            Self::Aac | Self::FdkAac | Self::M4a => "m4a",
            Self::Mp3 => "mp3",
            Self::Ogg | Self::Opus | Self::Vorbis => "ogg",
        }
    }

    pub fn is_copy(self) -> bool {
        self.codec() == "copy"
    }
}

/// Remote stream quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Auto,
    Normal,
    High,
    VeryHigh,
}

impl Quality {
    /// Resolve `auto` against the account tier
    pub fn resolve(self, premium: bool) -> Quality {
        match self {
            Self::Auto if premium => Self::VeryHigh,
            Self::Auto => Self::High,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Normal => "normal",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcode bitrate: derived from the quality tier or given explicitly (e.g. `256k`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Bitrate {
    Auto,
    Explicit(String),
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let digits = s.trim_end_matches(['k', 'K']);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid bitrate '{}', expected e.g. 160k or auto", s));
        }
        Ok(Self::Explicit(s.to_lowercase()))
    }
}

impl TryFrom<String> for Bitrate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        match value {
            Bitrate::Auto => "auto".to_string(),
            Bitrate::Explicit(b) => b,
        }
    }
}

/// Which message channels are printed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintSettings {
    pub skips: bool,
    pub errors: bool,
    pub warnings: bool,
    pub downloads: bool,
    pub progress_info: bool,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            skips: true,
            errors: true,
            warnings: true,
            downloads: true,
            progress_info: true,
        }
    }
}

/// Which traversal levels draw a progress bar
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub download: bool,
    pub url: bool,
    pub album: bool,
    pub artist: bool,
    pub playlist: bool,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            download: true,
            url: true,
            album: true,
            artist: true,
            playlist: true,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library root every output template is joined onto
    pub root_path: PathBuf,
    /// Global output template; overrides every per-mode template when non-empty
    pub output: String,
    pub output_single: String,
    pub output_album: String,
    pub output_playlist: String,
    pub output_extplaylist: String,
    pub output_liked: String,
    /// Scratch directory for in-flight downloads (beside the final file when unset)
    pub temp_download_dir: Option<PathBuf>,
    pub download_format: AudioFormat,
    pub download_quality: Quality,
    pub transcode_bitrate: Bitrate,
    /// Directory holding the global `.song_archive`
    pub song_archive_location: Option<PathBuf>,
    pub disable_directory_archives: bool,
    pub split_album_discs: bool,
    pub download_lyrics: bool,
    pub lyrics_location: Option<PathBuf>,
    /// Render syllable lyrics with per-word timestamps
    pub lyrics_enhanced: bool,
    pub save_genres: bool,
    pub all_genres: bool,
    pub genre_delimiter: String,
    pub skip_existing: bool,
    pub skip_previously_downloaded: bool,
    pub retry_attempts: u32,
    /// Seconds to wait after each downloaded track
    pub bulk_wait_time: u64,
    pub chunk_size: usize,
    /// Cap download speed to playback speed
    pub download_real_time: bool,
    pub read_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Concurrent track downloads inside one album or playlist
    pub parallel: usize,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffmpeg_log_level: String,
    pub api_url: String,
    pub stream_url: String,
    pub lyrics_url: String,
    pub print: PrintSettings,
    pub progress: ProgressSettings,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root_path: home.join("Music").join("tunedl"),
            output: String::new(),
            output_single: "{artist}/{album}/{artist} - {song_name}.{ext}".to_string(),
            output_album: "{artist}/{album}/{album_num} - {artist} - {song_name}.{ext}".to_string(),
            output_playlist: "{playlist}/{artist}_{song_name}.{ext}".to_string(),
            output_extplaylist: "{playlist}/{playlist_num}_{artist}_{song_name}.{ext}".to_string(),
            output_liked: "Liked Songs/{artist}_{song_name}.{ext}".to_string(),
            temp_download_dir: None,
            download_format: AudioFormat::Ogg,
            download_quality: Quality::Auto,
            transcode_bitrate: Bitrate::Auto,
            song_archive_location: None,
            disable_directory_archives: false,
            split_album_discs: false,
            download_lyrics: true,
            lyrics_location: None,
            lyrics_enhanced: false,
            save_genres: false,
            all_genres: false,
            genre_delimiter: ",".to_string(),
            skip_existing: true,
            skip_previously_downloaded: false,
            retry_attempts: 1,
            bulk_wait_time: 1,
            chunk_size: 20_000,
            download_real_time: false,
            read_timeout_secs: 30,
            request_timeout_secs: 30,
            parallel: 1,
            ffmpeg_path: None,
            ffmpeg_log_level: "error".to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
            stream_url: "http://127.0.0.1:4070/audio".to_string(),
            lyrics_url: "https://beautiful-lyrics.socalifornian.live/lyrics".to_string(),
            print: PrintSettings::default(),
            progress: ProgressSettings::default(),
        }
    }
}

impl Config {
    /// Load the config from `path` (or the default location), writing defaults if missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            debug!("No config found at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(&path)?;
            return Ok(config.normalized());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {:?}", path))?;

        debug!("Loaded config from {}", path.display());
        Ok(config.normalized())
    }

    /// Save the config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("tunedl").join("config.json"))
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if !FFMPEG_LOG_LEVELS.contains(&self.ffmpeg_log_level.as_str()) {
            anyhow::bail!(
                "Invalid ffmpeg_log_level '{}', expected one of: {}",
                self.ffmpeg_log_level,
                FFMPEG_LOG_LEVELS.join(", ")
            );
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if self.parallel == 0 {
            anyhow::bail!("parallel must be at least 1");
        }
        Ok(())
    }

    /// Global archive file (`.song_archive`)
    pub fn song_archive_path(&self) -> PathBuf {
        let dir = self.song_archive_location.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from(".tunedl"))
                .join("tunedl")
        });
        dir.join(crate::archive::GLOBAL_ARCHIVE_FILE)
    }

    /// Expand `~` and turn empty strings into `None`
    fn normalized(mut self) -> Self {
        self.root_path = expand_home(&self.root_path);
        self.temp_download_dir = non_empty(self.temp_download_dir.take());
        self.song_archive_location = non_empty(self.song_archive_location.take());
        self.lyrics_location = non_empty(self.lyrics_location.take());
        self.ffmpeg_path = non_empty(self.ffmpeg_path.take());
        self
    }
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
        .map(|p| expand_home(&p))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 20_000);
        assert!(config.skip_existing);
        assert!(!config.skip_previously_downloaded);
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.download_format, AudioFormat::Ogg);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "download_format": "mp3", "transcode_bitrate": "256k", "temp_download_dir": "" }"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.download_format, AudioFormat::Mp3);
        assert_eq!(config.transcode_bitrate, Bitrate::Explicit("256k".to_string()));
        assert_eq!(config.temp_download_dir, None);
        assert_eq!(config.bulk_wait_time, 1);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = Config {
            ffmpeg_log_level: "loud".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bitrate_parsing() {
        assert_eq!("auto".parse::<Bitrate>().unwrap(), Bitrate::Auto);
        assert_eq!("".parse::<Bitrate>().unwrap(), Bitrate::Auto);
        assert_eq!(
            "320K".parse::<Bitrate>().unwrap(),
            Bitrate::Explicit("320k".to_string())
        );
        assert!("fast".parse::<Bitrate>().is_err());
    }

    #[test]
    fn test_quality_resolution() {
        assert_eq!(Quality::Auto.resolve(true), Quality::VeryHigh);
        assert_eq!(Quality::Auto.resolve(false), Quality::High);
        assert_eq!(Quality::Normal.resolve(true), Quality::Normal);
    }

    #[test]
    fn test_format_codec_and_extension() {
        assert_eq!(AudioFormat::Mp3.codec(), "libmp3lame");
        assert_eq!(AudioFormat::Opus.extension(), "ogg");
        assert!(AudioFormat::Vorbis.is_copy());
        assert_eq!(AudioFormat::FdkAac.extension(), "m4a");
    }
}
