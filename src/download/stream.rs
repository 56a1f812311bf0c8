//! Raw audio streaming and the chunked read loop

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::StreamError;
use crate::config::Quality;

/// Empty reads tolerated back to back before the stream counts as exhausted
const MAX_EMPTY_READS: u32 = 5;

/// An open audio stream with a known total size
#[async_trait]
pub trait AudioStream: Send {
    fn total_size(&self) -> u64;

    /// Next chunk of at most `max` bytes; `None` once the stream has ended
    ///
    /// An empty chunk means nothing was available yet, not end of data.
    async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, StreamError>;
}

/// Opens raw audio streams for canonical track ids
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn open(&self, id: &str, quality: Quality) -> Result<Box<dyn AudioStream>, StreamError>;

    /// Account tier, used for auto quality and bitrate
    fn is_premium(&self) -> bool;
}

/// Audio source backed by an HTTP streaming bridge
pub struct HttpAudioSource {
    base_url: String,
    token: String,
    premium: bool,
    http_client: Client,
}

impl HttpAudioSource {
    pub fn new(
        base_url: &str,
        token: &str,
        premium: bool,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http_client = Client::builder()
            .user_agent(concat!("tunedl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            premium,
            http_client,
        })
    }
}

#[async_trait]
impl AudioSource for HttpAudioSource {
    async fn open(&self, id: &str, quality: Quality) -> Result<Box<dyn AudioStream>, StreamError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(id));
        debug!("Opening audio stream {} ({})", url, quality);

        let open_err = |reason: String| StreamError::Open {
            id: id.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("quality", quality.as_str())])
            .send()
            .await
            .map_err(|e| open_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(open_err(format!("status {}", response.status())));
        }

        let total = response.content_length().unwrap_or(0);
        Ok(Box::new(HttpAudioStream {
            total,
            body: response.bytes_stream().boxed(),
            buffer: BytesMut::new(),
            finished: false,
        }))
    }

    fn is_premium(&self) -> bool {
        self.premium
    }
}

struct HttpAudioStream {
    total: u64,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: BytesMut,
    finished: bool,
}

#[async_trait]
impl AudioStream for HttpAudioStream {
    fn total_size(&self) -> u64 {
        self.total
    }

    async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, StreamError> {
        while self.buffer.len() < max && !self.finished {
            match self.body.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(StreamError::Read(e.to_string())),
                None => self.finished = true,
            }
        }
        if self.buffer.is_empty() && self.finished {
            return Ok(None);
        }
        let take = max.min(self.buffer.len());
        Ok(Some(self.buffer.split_to(take).freeze()))
    }
}

/// Knobs for [`stream_to_file`]
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub chunk_size: usize,
    pub read_timeout: Duration,
    /// Cap download speed to playback speed
    pub real_time: bool,
    pub duration: Duration,
}

/// Copy `stream` into `file` chunk by chunk, returning the bytes written
///
/// Ends on end-of-stream or after `MAX_EMPTY_READS` consecutive empty reads.
/// Every read is bounded by `read_timeout` and aborts when `cancel` fires.
pub async fn stream_to_file<F>(
    stream: &mut dyn AudioStream,
    file: &mut File,
    path: &Path,
    options: &StreamOptions,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<u64, StreamError>
where
    F: FnMut(u64) + Send,
{
    let total = stream.total_size();
    let started = Instant::now();
    let mut downloaded: u64 = 0;
    let mut empty_reads = 0;

    let io_err = |source: std::io::Error| StreamError::Io {
        path: path.to_path_buf(),
        source,
    };

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            read = tokio::time::timeout(
                options.read_timeout,
                stream.read_chunk(options.chunk_size),
            ) => read,
        };
        let chunk = match read.map_err(|_| StreamError::Timeout(options.read_timeout))?? {
            Some(chunk) => chunk,
            None => break,
        };

        if chunk.is_empty() {
            empty_reads += 1;
            if empty_reads >= MAX_EMPTY_READS {
                warn!("Stream returned {} empty reads, treating as finished", empty_reads);
                break;
            }
            continue;
        }
        empty_reads = 0;

        file.write_all(&chunk).await.map_err(io_err)?;
        downloaded += chunk.len() as u64;
        on_progress(chunk.len() as u64);

        if options.real_time && total > 0 {
            let target = options.duration.mul_f64(downloaded as f64 / total as f64);
            if let Some(ahead) = target.checked_sub(started.elapsed()) {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                    _ = tokio::time::sleep(ahead) => {}
                }
            }
        }
    }

    file.flush().await.map_err(io_err)?;
    if total > 0 && downloaded < total {
        warn!("Stream ended after {} of {} bytes", downloaded, total);
    }
    Ok(downloaded)
}
