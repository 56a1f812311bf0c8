//! Append-only logs of downloaded track ids
//!
//! Two scopes coexist: one `.song_ids` file per output directory and a single
//! global `.song_archive` for the whole library. Each record is one line:
//! `id\ttimestamp\tartist\ttitle\tfilename`.

use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const DIRECTORY_ARCHIVE_FILE: &str = ".song_ids";
pub const GLOBAL_ARCHIVE_FILE: &str = ".song_archive";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to read archive {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append to archive {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which archive a lookup or record targets
#[derive(Debug, Clone, Copy)]
pub enum ArchiveScope<'a> {
    /// The archive belonging to this output directory
    Directory(&'a Path),
    Global,
}

/// One archived download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub id: String,
    pub timestamp: String,
    pub artist: String,
    pub title: String,
    pub filename: String,
}

impl ArchiveEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let id = fields.next().filter(|id| !id.is_empty())?.to_string();
        let mut next = || fields.next().unwrap_or_default().to_string();
        Some(Self {
            id,
            timestamp: next(),
            artist: next(),
            title: next(),
            filename: next(),
        })
    }
}

fn clean_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// Reads and appends both archive scopes
///
/// Appends to a given file are serialized, and each record goes out in a
/// single write so concurrent downloads never interleave a line.
pub struct ArchiveStore {
    global_path: PathBuf,
    directories_disabled: bool,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArchiveStore {
    pub fn new(global_path: PathBuf, directories_disabled: bool) -> Self {
        Self {
            global_path,
            directories_disabled,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn directories_disabled(&self) -> bool {
        self.directories_disabled
    }

    /// Archive file for a scope, or `None` when directory archives are off
    pub fn path_for(&self, scope: ArchiveScope<'_>) -> Option<PathBuf> {
        match scope {
            ArchiveScope::Directory(_) if self.directories_disabled => None,
            ArchiveScope::Directory(dir) => Some(dir.join(DIRECTORY_ARCHIVE_FILE)),
            ArchiveScope::Global => Some(self.global_path.clone()),
        }
    }

    /// All entries in a scope; a missing archive file is empty
    pub async fn entries(
        &self,
        scope: ArchiveScope<'_>,
    ) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let Some(path) = self.path_for(scope) else {
            return Ok(Vec::new());
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArchiveError::Read { path, source }),
        };
        Ok(content.lines().filter_map(ArchiveEntry::parse).collect())
    }

    /// Whether `id` is recorded in the scope
    ///
    /// Always false for directory scope when directory archives are disabled.
    pub async fn is_known(&self, scope: ArchiveScope<'_>, id: &str) -> Result<bool, ArchiveError> {
        Ok(self.entries(scope).await?.iter().any(|e| e.id == id))
    }

    /// Append a record; a no-op for directory scope when directory archives are disabled
    pub async fn record(
        &self,
        scope: ArchiveScope<'_>,
        id: &str,
        filename: &str,
        artist: &str,
        title: &str,
    ) -> Result<(), ArchiveError> {
        let Some(path) = self.path_for(scope) else {
            return Ok(());
        };

        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            clean_field(id),
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            clean_field(artist),
            clean_field(title),
            clean_field(filename)
        );

        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ArchiveError::Write {
                    path: path.clone(),
                    source,
                })?;
        }

        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        };
        write.await.map_err(|source| ArchiveError::Write {
            path: path.clone(),
            source,
        })?;

        debug!("Archived {} in {}", id, path.display());
        Ok(())
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, disabled: bool) -> ArchiveStore {
        ArchiveStore::new(dir.path().join("data").join(GLOBAL_ARCHIVE_FILE), disabled)
    }

    #[tokio::test]
    async fn test_missing_archive_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, false);
        assert!(!store.is_known(ArchiveScope::Global, "abc").await.unwrap());
        assert!(!store
            .is_known(ArchiveScope::Directory(tmp.path()), "abc")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_record_then_known() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, false);
        let dir = ArchiveScope::Directory(tmp.path());

        store.record(dir, "abc123", "A - B.ogg", "Artist A", "Song B").await.unwrap();

        assert!(store.is_known(dir, "abc123").await.unwrap());
        assert!(!store.is_known(ArchiveScope::Global, "abc123").await.unwrap());

        let entries = store.entries(dir).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "A - B.ogg");
        assert_eq!(entries[0].artist, "Artist A");
    }

    #[tokio::test]
    async fn test_global_archive_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, false);
        store.record(ArchiveScope::Global, "x1", "f.ogg", "a", "t").await.unwrap();
        assert!(tmp.path().join("data").join(GLOBAL_ARCHIVE_FILE).is_file());
    }

    #[tokio::test]
    async fn test_disabled_directory_archive() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, true);
        let dir = ArchiveScope::Directory(tmp.path());

        store.record(dir, "abc", "f.ogg", "a", "t").await.unwrap();

        assert!(!store.is_known(dir, "abc").await.unwrap());
        assert!(!tmp.path().join(DIRECTORY_ARCHIVE_FILE).exists());
    }

    #[tokio::test]
    async fn test_fields_cannot_break_lines() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, false);
        store
            .record(ArchiveScope::Global, "id1", "f.ogg", "Art\tist", "Ti\ntle")
            .await
            .unwrap();
        let entries = store.entries(ArchiveScope::Global).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Ti tle");
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_whole() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(store(&tmp, false));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .record(ArchiveScope::Global, &format!("id{i}"), "f.ogg", "a", "t")
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let entries = store.entries(ArchiveScope::Global).await.unwrap();
        assert_eq!(entries.len(), 32);
        assert!(entries.iter().all(|e| e.filename == "f.ogg"));
    }
}
