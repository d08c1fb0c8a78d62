//! `StreamStorage`: durable, ordered, append-only log per path.
//!
//! A trait with two implementations: an in-memory map and an NDJSON
//! file backend with an `.offset` sidecar.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use event_types::{Event, Offset, StreamPath};
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum StorageFailure {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("corrupt record at {path}:{line}: {source}")]
    Corrupt {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Filter bounds for a read: `from < offset <= to`, both optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadRange {
    pub from: Option<Offset>,
    pub to: Option<Offset>,
}

impl ReadRange {
    pub fn from(from: Offset) -> Self {
        ReadRange {
            from: Some(from),
            to: None,
        }
    }

    fn matches(&self, offset: Offset) -> bool {
        let after_from = match self.from {
            Some(f) => offset > f,
            None => true,
        };
        let before_to = match self.to {
            Some(t) => offset <= t,
            None => true,
        };
        after_from && before_to
    }
}

/// Durable, ordered, append-only log per path.
///
/// Need not be concurrency-safe for concurrent appends on the same
/// path — `EventStream` serializes those. Must support concurrent
/// reads alongside appends, with readers seeing a consistent prefix.
#[async_trait::async_trait]
pub trait StreamStorage: Send + Sync {
    /// Persist an already offset-assigned event.
    async fn append(&self, event: Event) -> Result<Event, StorageFailure>;

    /// Read every persisted event on `path` matching `range`, in offset order.
    async fn read(&self, path: &StreamPath, range: ReadRange) -> Result<Vec<Event>, StorageFailure>;

    /// The highest offset persisted for `path`, or `Offset::none()` if empty.
    async fn last_offset(&self, path: &StreamPath) -> Result<Offset, StorageFailure>;

    /// Every path with at least one persisted event.
    async fn list_paths(&self) -> Result<Vec<StreamPath>, StorageFailure>;
}

/// An ordered slice per path plus a `nextOffset` counter.
#[derive(Default)]
pub struct InMemoryStorage {
    paths: RwLock<HashMap<StreamPath, Vec<Event>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StreamStorage for InMemoryStorage {
    async fn append(&self, event: Event) -> Result<Event, StorageFailure> {
        let mut paths = self.paths.write();
        paths.entry(event.path.clone()).or_default().push(event.clone());
        Ok(event)
    }

    async fn read(&self, path: &StreamPath, range: ReadRange) -> Result<Vec<Event>, StorageFailure> {
        let paths = self.paths.read();
        Ok(paths
            .get(path)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| range.matches(e.offset))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_offset(&self, path: &StreamPath) -> Result<Offset, StorageFailure> {
        let paths = self.paths.read();
        Ok(paths
            .get(path)
            .and_then(|events| events.last())
            .map(|e| e.offset)
            .unwrap_or_else(Offset::none))
    }

    async fn list_paths(&self) -> Result<Vec<StreamPath>, StorageFailure> {
        let paths = self.paths.read();
        Ok(paths.keys().cloned().collect())
    }
}

/// Append-only NDJSON files with a sidecar next-offset counter.
///
/// Layout per path `p`: `<base>/<p-with-slashes-to-underscores>.ndjson`
/// (one JSON `Event` per line, append order) plus a sidecar
/// `<...>.ndjson.offset` holding the decimal next offset. On boot, a
/// missing sidecar is derived by counting NDJSON lines; a sidecar that
/// disagrees with the NDJSON line count is rewritten to match it.
pub struct FileStorage {
    base_dir: PathBuf,
    locks: RwLock<HashMap<StreamPath, std::sync::Arc<tokio::sync::Mutex<()>>>>,
}

impl FileStorage {
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StorageFailure> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(FileStorage {
            base_dir,
            locks: RwLock::new(HashMap::new()),
        })
    }

    fn ndjson_path(&self, path: &StreamPath) -> PathBuf {
        self.base_dir.join(format!("{}.ndjson", path.to_filename_stem()))
    }

    fn offset_sidecar_path(&self, path: &StreamPath) -> PathBuf {
        self.base_dir.join(format!("{}.ndjson.offset", path.to_filename_stem()))
    }

    fn lock_for(&self, path: &StreamPath) -> std::sync::Arc<tokio::sync::Mutex<()>> {
        if let Some(lock) = self.locks.read().get(path) {
            return lock.clone();
        }
        self.locks
            .write()
            .entry(path.clone())
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn read_all_lines(file: &Path) -> Result<Vec<String>, StorageFailure> {
        match tokio::fs::read_to_string(file).await {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn decode_events(path: &StreamPath, lines: &[String]) -> Result<Vec<Event>, StorageFailure> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| StorageFailure::Corrupt {
                    path: path.to_string(),
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }

    async fn rewrite_sidecar(&self, path: &StreamPath, next_offset: Offset) -> Result<(), StorageFailure> {
        tokio::fs::write(self.offset_sidecar_path(path), next_offset.to_string()).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StreamStorage for FileStorage {
    async fn append(&self, event: Event) -> Result<Event, StorageFailure> {
        let lock = self.lock_for(&event.path);
        let _guard = lock.lock().await;

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ndjson_path(&event.path))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.rewrite_sidecar(&event.path, event.offset.next()).await?;
        Ok(event)
    }

    async fn read(&self, path: &StreamPath, range: ReadRange) -> Result<Vec<Event>, StorageFailure> {
        let lines = Self::read_all_lines(&self.ndjson_path(path)).await?;
        let events = Self::decode_events(path, &lines).await?;
        Ok(events.into_iter().filter(|e| range.matches(e.offset)).collect())
    }

    async fn last_offset(&self, path: &StreamPath) -> Result<Offset, StorageFailure> {
        let lines = Self::read_all_lines(&self.ndjson_path(path)).await?;
        let line_count = lines.len();

        let sidecar_next = match tokio::fs::read_to_string(self.offset_sidecar_path(path)).await {
            Ok(s) => s.trim().parse::<Offset>().ok(),
            Err(_) => None,
        };
        let derived_next = if line_count == 0 {
            Offset::none()
        } else {
            Offset::from_u64(line_count as u64 - 1).next()
        };

        if sidecar_next != Some(derived_next) {
            self.rewrite_sidecar(path, derived_next).await?;
        }

        Ok(if line_count == 0 {
            Offset::none()
        } else {
            Offset::from_u64(line_count as u64 - 1)
        })
    }

    async fn list_paths(&self) -> Result<Vec<StreamPath>, StorageFailure> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".ndjson")
                && let Ok(path) = StreamPath::new(stem.to_string())
            {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}
