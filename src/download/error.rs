//! Per-track failure taxonomy

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::catalog::ApiError;

/// Metadata could not be resolved; aborts the track before any write
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("catalog returned no track for id {0}")]
    MissingTrack(String),

    #[error("failed to resolve genres: {0}")]
    Genres(#[source] ApiError),
}

/// Streaming the raw audio failed
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("could not open audio stream for {id}: {reason}")]
    Open { id: String, reason: String },

    #[error("audio stream read failed: {0}")]
    Read(String),

    #[error("audio stream stalled for {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("download cancelled")]
    Cancelled,

    #[error("failed writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The external converter failed
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("converter executable not found: {0}")]
    ToolMissing(String),

    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("failed to run converter: {0}")]
    Io(#[from] std::io::Error),
}

/// Tags or artwork could not be written
#[derive(Debug, Error)]
pub enum TagError {
    #[error(transparent)]
    Lofty(#[from] lofty::error::LoftyError),

    #[error("no tag could be created for {}", .0.display())]
    NoTag(PathBuf),

    #[error("cover art unusable: {0}")]
    CoverArt(String),
}

/// Anything that fails a track after its metadata resolved
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("filesystem error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
