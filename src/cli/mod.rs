//! CLI module for tunedl

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod auth;
pub mod commands;

pub use auth::TokenStore;

use crate::config::{AudioFormat, Bitrate, Config, Quality};

#[derive(Parser, Debug)]
#[command(name = "tunedl", about = "Download, convert and tag tracks into a local music library")]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "TUNEDL_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store the catalog access token in the system keyring
    Auth {
        /// Access token (prompted for when omitted)
        #[arg(long, env = "TUNEDL_TOKEN")]
        token: Option<String>,

        /// Remove the stored token instead
        #[arg(long, conflicts_with = "token")]
        clear: bool,
    },

    /// Download tracks, albums, artists or playlists by link or id
    Download {
        /// Links or bare track ids
        #[arg(value_name = "URL", required_unless_present = "file")]
        urls: Vec<String>,

        /// Read links from a file, one per line
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Download your liked songs
    Liked,

    /// Download your playlists
    Playlists {
        /// Pick which playlists to download instead of taking all of them
        #[arg(short, long)]
        select: bool,
    },

    /// Download the discographies of every artist you follow
    Followed,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Command line values that replace config file settings for one run
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    #[arg(long, global = true, value_name = "DIR")]
    pub root_path: Option<PathBuf>,

    /// Output template used for every download mode
    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub output: Option<String>,

    #[arg(long, global = true, value_enum)]
    pub download_format: Option<AudioFormat>,

    #[arg(long, global = true, value_enum)]
    pub download_quality: Option<Quality>,

    /// e.g. 160k, or auto
    #[arg(long, global = true)]
    pub transcode_bitrate: Option<Bitrate>,

    #[arg(long, global = true, value_name = "DIR")]
    pub temp_download_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub skip_existing: Option<bool>,

    #[arg(long, global = true)]
    pub skip_previously_downloaded: Option<bool>,

    #[arg(long, global = true)]
    pub disable_directory_archives: Option<bool>,

    #[arg(long, global = true)]
    pub split_album_discs: Option<bool>,

    #[arg(long, global = true)]
    pub download_lyrics: Option<bool>,

    #[arg(long, global = true)]
    pub download_real_time: Option<bool>,

    /// Seconds to wait after each downloaded track
    #[arg(long, global = true, value_name = "SECS")]
    pub bulk_wait_time: Option<u64>,

    /// Tracks downloaded at once inside an album or playlist
    #[arg(short, long, global = true)]
    pub parallel: Option<usize>,
}

impl ConfigOverrides {
    /// Apply every flag that was given
    pub fn apply(self, config: &mut Config) {
        if let Some(v) = self.root_path {
            config.root_path = crate::config::expand_home(&v);
        }
        if let Some(v) = self.output {
            config.output = v;
        }
        if let Some(v) = self.download_format {
            config.download_format = v;
        }
        if let Some(v) = self.download_quality {
            config.download_quality = v;
        }
        if let Some(v) = self.transcode_bitrate {
            config.transcode_bitrate = v;
        }
        if let Some(v) = self.temp_download_dir {
            config.temp_download_dir = Some(crate::config::expand_home(&v));
        }
        if let Some(v) = self.skip_existing {
            config.skip_existing = v;
        }
        if let Some(v) = self.skip_previously_downloaded {
            config.skip_previously_downloaded = v;
        }
        if let Some(v) = self.disable_directory_archives {
            config.disable_directory_archives = v;
        }
        if let Some(v) = self.split_album_discs {
            config.split_album_discs = v;
        }
        if let Some(v) = self.download_lyrics {
            config.download_lyrics = v;
        }
        if let Some(v) = self.download_real_time {
            config.download_real_time = v;
        }
        if let Some(v) = self.bulk_wait_time {
            config.bulk_wait_time = v;
        }
        if let Some(v) = self.parallel {
            config.parallel = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "tunedl",
            "download",
            "abc123",
            "--download-format",
            "mp3",
            "--skip-existing",
            "false",
            "--parallel",
            "3",
        ]);
        let mut config = Config::default();
        cli.overrides.apply(&mut config);

        assert_eq!(config.download_format, AudioFormat::Mp3);
        assert!(!config.skip_existing);
        assert_eq!(config.parallel, 3);
        assert_eq!(config.bulk_wait_time, 1);
    }

    #[test]
    fn test_download_requires_urls_or_file() {
        assert!(Cli::try_parse_from(["tunedl", "download"]).is_err());
        assert!(Cli::try_parse_from(["tunedl", "download", "--file", "links.txt"]).is_ok());
    }
}
