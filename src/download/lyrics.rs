//! Synced lyrics: fetching, rendering to LRC, writing the sidecar

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::utils::sanitize_filename;

/// Gap in seconds after which a blank timestamp line is inserted
const GAP_SECONDS: f64 = 5.0;

#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("lyrics request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lyrics provider returned status {0}")]
    Status(u16),

    #[error("unexpected lyrics document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lyrics document as served by the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Type")]
pub enum LyricsDocument {
    /// One timestamp per line
    Line {
        #[serde(rename = "Content")]
        content: Vec<LineItem>,
    },
    /// Per-syllable timing
    Syllable {
        #[serde(rename = "Content")]
        content: Vec<SyllableItem>,
    },
    /// No timing at all
    Static {
        #[serde(rename = "Lines")]
        lines: Vec<StaticLine>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyllableItem {
    #[serde(rename = "Type")]
    pub kind: String,
    pub lead: Option<SyllableLine>,
    #[serde(default)]
    pub background: Vec<SyllableLine>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyllableLine {
    pub start_time: f64,
    pub end_time: f64,
    pub syllables: Vec<Syllable>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Syllable {
    pub text: String,
    pub start_time: f64,
    pub is_part_of_word: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StaticLine {
    pub text: String,
}

impl LyricsDocument {
    pub fn is_time_synced(&self) -> bool {
        !matches!(self, Self::Static { .. })
    }
}

/// `mm:ss.xx`
pub fn lrc_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    format!("{:02}:{:05.2}", minutes as u64, seconds - minutes * 60.0)
}

/// Accumulates rendered lines, inserting gap markers between distant lines
struct LrcWriter {
    lines: Vec<String>,
    prev_end: f64,
}

impl LrcWriter {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            prev_end: 0.0,
        }
    }

    fn push(&mut self, start: f64, end: f64, line: String) {
        if start - self.prev_end > GAP_SECONDS {
            self.lines.push(format!("[{}]", lrc_timestamp(self.prev_end)));
        }
        self.lines.push(line);
        self.prev_end = end;
    }
}

fn plain_syllables(syllables: &[Syllable]) -> String {
    syllables
        .iter()
        .map(|s| {
            if s.is_part_of_word {
                s.text.clone()
            } else {
                format!("{} ", s.text)
            }
        })
        .collect()
}

fn enhanced_lead(syllables: &[Syllable]) -> String {
    let mut line = String::new();
    let mut joined = false;
    for s in syllables {
        if joined {
            line.push_str(&s.text);
        } else {
            line.push_str(&format!(" <{}> {}", lrc_timestamp(s.start_time), s.text));
        }
        joined = s.is_part_of_word;
    }
    line
}

fn enhanced_background(syllables: &[Syllable]) -> String {
    let mut line = String::new();
    let last = syllables.len().saturating_sub(1);
    for (index, s) in syllables.iter().enumerate() {
        let open = if index == 0 { "(" } else { "" };
        let close = if index == last { ")" } else { "" };
        if s.is_part_of_word {
            let sep = if index == 0 || index == last { "" } else { " " };
            line.push_str(&format!("{}{}{}{}", sep, open, s.text, close));
        } else {
            let ts = lrc_timestamp(s.start_time);
            line.push_str(&format!(" <{}> {}{}{}", ts, open, s.text, close));
        }
    }
    line
}

/// Render a document to LRC lines
///
/// `enhanced` adds per-word timestamps to syllable documents; line documents
/// always render in the standard form.
pub fn render_lrc(document: &LyricsDocument, enhanced: bool) -> Vec<String> {
    let mut out = LrcWriter::new();
    match document {
        LyricsDocument::Line { content } => {
            for item in content.iter().filter(|i| i.kind == "Vocal") {
                let line = format!("[{}] {}", lrc_timestamp(item.start_time), item.text.trim());
                out.push(item.start_time, item.end_time, line);
            }
        }
        LyricsDocument::Syllable { content } => {
            for item in content {
                if let Some(lead) = item.lead.as_ref().filter(|_| item.kind == "Vocal") {
                    let ts = lrc_timestamp(lead.start_time);
                    let line = if enhanced {
                        format!("[{}]{}", ts, enhanced_lead(&lead.syllables).trim())
                    } else {
                        format!("[{}] {}", ts, plain_syllables(&lead.syllables).trim())
                    };
                    out.push(lead.start_time, lead.end_time, line);
                }
                for bg in &item.background {
                    let ts = lrc_timestamp(bg.start_time);
                    let line = if enhanced {
                        format!("[{}]{}", ts, enhanced_background(&bg.syllables).trim())
                    } else {
                        format!("[{}] ({})", ts, plain_syllables(&bg.syllables).trim_end())
                    };
                    out.push(bg.start_time, bg.end_time, line);
                }
            }
        }
        LyricsDocument::Static { lines } => {
            return lines.iter().map(|l| l.text.trim().to_string()).collect();
        }
    }
    out.lines
}

/// `{artist} - {title}.lrc`, sanitized
pub fn lrc_filename(artist: &str, title: &str) -> String {
    format!("{} - {}.lrc", sanitize_filename(artist), sanitize_filename(title))
}

/// Render and write the sidecar into `dir`, returning its path
pub async fn write_lrc(
    dir: &Path,
    artist: &str,
    title: &str,
    document: &LyricsDocument,
    enhanced: bool,
) -> Result<PathBuf, LyricsError> {
    let path = dir.join(lrc_filename(artist, title));
    let body = render_lrc(document, enhanced).join("\n");
    let write = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, body).await
    };
    write.await.map_err(|source| LyricsError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Source of lyrics documents for canonical track ids
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// `None` when the provider has no lyrics for the track
    async fn fetch(&self, id: &str) -> Result<Option<LyricsDocument>, LyricsError>;
}

pub struct HttpLyricsProvider {
    base_url: String,
    http_client: Client,
}

impl HttpLyricsProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http_client = Client::builder()
            .user_agent(concat!("tunedl/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl LyricsProvider for HttpLyricsProvider {
    async fn fetch(&self, id: &str) -> Result<Option<LyricsDocument>, LyricsError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(id));
        debug!("Fetching lyrics from {}", url);

        // The provider accepts any bearer value
        let response = self.http_client.get(&url).bearer_auth("tunedl").send().await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            other => return Err(LyricsError::Status(other.as_u16())),
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
