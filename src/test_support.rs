//! In-memory collaborators for tests

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::catalog::{ApiError, CatalogApi};
use crate::config::{AudioFormat, Config, PrintSettings, ProgressSettings, Quality};
use crate::download::{Collaborators, TrackDownloader};
use crate::download::error::{ConvertError, StreamError};
use crate::download::lyrics::{LyricsDocument, LyricsError, LyricsProvider};
use crate::download::stream::{AudioSource, AudioStream};
use crate::download::transcode::Converter;
use crate::progress::ProgressDisplay;

/// Track object as the catalog returns it
pub fn track_json(id: &str, artist: &str, title: &str, album: &str) -> Value {
    let slug = artist.to_lowercase().replace(' ', "-");
    json!({
        "id": id,
        "name": title,
        "artists": [{
            "id": slug,
            "name": artist,
            "href": format!("https://api.example/artists/{}", slug)
        }],
        "album": {
            "id": "album-1",
            "name": album,
            "artists": [{ "id": slug, "name": artist }],
            "release_date": "2019-04-01",
            "total_tracks": 12,
            "images": [
                { "url": "https://img.example/64", "width": 64, "height": 64 },
                { "url": "https://img.example/640", "width": 640, "height": 640 }
            ]
        },
        "disc_number": 1,
        "track_number": 3,
        "is_playable": true,
        "duration_ms": 215000
    })
}

/// Catalog answering from a fixed url → document map
///
/// Paged requests are keyed as `url?k=v&k=v` in parameter order.
#[derive(Default)]
pub struct StubCatalog {
    responses: HashMap<String, Value>,
    pub requests: Mutex<Vec<String>>,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, value: Value) -> Self {
        self.responses.insert(url.to_string(), value);
        self
    }

    pub fn with_track(self, track: Value) -> Self {
        let id = track["id"].as_str().unwrap_or_default().to_string();
        self.with_response(
            &format!("tracks?ids={}&market=from_token", id),
            json!({ "tracks": [track] }),
        )
    }

    fn lookup(&self, key: &str) -> Result<Value, ApiError> {
        self.requests.lock().unwrap().push(key.to_string());
        self.responses.get(key).cloned().ok_or(ApiError::Status {
            url: key.to_string(),
            status: 404,
        })
    }
}

#[async_trait]
impl CatalogApi for StubCatalog {
    async fn fetch(&self, url: &str) -> Result<(String, Value), ApiError> {
        let value = self.lookup(url)?;
        Ok((value.to_string(), value))
    }

    async fn fetch_paged(&self, url: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let key = if query.is_empty() {
            url.to_string()
        } else {
            format!("{}?{}", url, query.join("&"))
        };
        self.lookup(&key)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ApiError> {
        self.requests.lock().unwrap().push(url.to_string());
        Err(ApiError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Stream replaying a fixed script of reads; `None` entries end the stream
pub struct ScriptedStream {
    total: u64,
    script: VecDeque<Option<Bytes>>,
    fail_after: Option<usize>,
    reads: usize,
}

impl ScriptedStream {
    pub fn new(script: Vec<Option<Bytes>>) -> Self {
        let total = script.iter().flatten().map(|b| b.len() as u64).sum();
        Self {
            total,
            script: script.into(),
            fail_after: None,
            reads: 0,
        }
    }

    pub fn from_bytes(data: &[u8], chunk: usize) -> Self {
        let mut script: Vec<Option<Bytes>> = data
            .chunks(chunk)
            .map(|c| Some(Bytes::copy_from_slice(c)))
            .collect();
        script.push(None);
        Self::new(script)
    }

    pub fn failing_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }
}

#[async_trait]
impl AudioStream for ScriptedStream {
    fn total_size(&self) -> u64 {
        self.total
    }

    async fn read_chunk(&mut self, _max: usize) -> Result<Option<Bytes>, StreamError> {
        if self.fail_after == Some(self.reads) {
            return Err(StreamError::Read("connection reset".into()));
        }
        self.reads += 1;
        Ok(self.script.pop_front().flatten())
    }
}

/// Audio source serving the same bytes for every id
pub struct StubAudio {
    data: Vec<u8>,
    fail_after: Option<usize>,
    pub opened: Mutex<Vec<(String, Quality)>>,
}

impl StubAudio {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            fail_after: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }

    pub fn opened_ids(&self) -> Vec<String> {
        self.opened.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl AudioSource for StubAudio {
    async fn open(&self, id: &str, quality: Quality) -> Result<Box<dyn AudioStream>, StreamError> {
        self.opened.lock().unwrap().push((id.to_string(), quality));
        let mut stream = ScriptedStream::from_bytes(&self.data, 3);
        if let Some(reads) = self.fail_after {
            stream = stream.failing_after(reads);
        }
        Ok(Box::new(stream))
    }

    fn is_premium(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterBehavior {
    Copy,
    Missing,
    Fail,
}

/// Converter that copies its input, or fails in a chosen way
pub struct StubConverter {
    behavior: ConverterBehavior,
    pub calls: Mutex<Vec<(AudioFormat, Option<String>)>>,
}

impl StubConverter {
    pub fn new(behavior: ConverterBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Converter for StubConverter {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate: Option<&str>,
    ) -> Result<(), ConvertError> {
        self.calls
            .lock()
            .unwrap()
            .push((format, bitrate.map(str::to_string)));
        match self.behavior {
            ConverterBehavior::Copy => {
                tokio::fs::copy(input, output).await?;
                Ok(())
            }
            ConverterBehavior::Missing => Err(ConvertError::ToolMissing("ffmpeg".into())),
            ConverterBehavior::Fail => Err(ConvertError::Failed("invalid data".into())),
        }
    }
}

/// Lyrics provider returning the same document (or none) for every id
#[derive(Default)]
pub struct StubLyrics {
    document: Option<Value>,
}

impl StubLyrics {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        Self {
            document: Some(document),
        }
    }
}

#[async_trait]
impl LyricsProvider for StubLyrics {
    async fn fetch(&self, _id: &str) -> Result<Option<LyricsDocument>, LyricsError> {
        match &self.document {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

/// Config rooted in a temp dir: library under `library/`, archive under `data/`
pub fn test_config(root: &Path) -> Config {
    Config {
        root_path: root.join("library"),
        song_archive_location: Some(root.join("data")),
        bulk_wait_time: 0,
        download_lyrics: false,
        ..Config::default()
    }
}

/// Downloader over `catalog` with copying converter and fixed audio bytes
pub fn downloader(config: Config, catalog: StubCatalog) -> TrackDownloader {
    let services = Collaborators {
        catalog: Arc::new(catalog),
        audio: Arc::new(StubAudio::new(b"OggS fake vorbis payload")),
        converter: Arc::new(StubConverter::new(ConverterBehavior::Copy)),
        lyrics: Arc::new(StubLyrics::none()),
    };
    let display = ProgressDisplay::hidden(PrintSettings::default(), ProgressSettings::default());
    TrackDownloader::new(Arc::new(config), services, display, CancellationToken::new())
}
