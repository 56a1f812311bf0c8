//! Per-track acquisition pipeline
//!
//! Resolves metadata and a destination, consults the archives, streams the audio,
//! converts and tags it, then records the download.

pub mod engine;
pub mod error;
pub mod lyrics;
pub mod metadata;
pub mod path;
pub mod stream;
pub mod tags;
pub mod transcode;

pub use engine::{error_chain, Collaborators, DownloadOutcome, TrackDownloader, TrackRequest};
pub use lyrics::HttpLyricsProvider;
pub use path::{ExtraKeys, OutputMode};
pub use stream::HttpAudioSource;
pub use transcode::FfmpegConverter;
