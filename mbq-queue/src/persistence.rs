//! Queue persistence
//!
//! JSON document holding the queue's entries in order:
//!
//! ```json
//! { "version": 2, "entries": [ { "version": 2, "id": "...", "kind": "download",
//!   "source": { ... }, "meta": { ... }, "from_playlist": false } ] }
//! ```
//!
//! Only metadata is stored. Restored entries always start `Pending`.

use crate::entry::{Entry, EntryKind, EntryMeta, SourceMeta};
use crate::error::{Error, Result};
use crate::events::{QueueEvent, QueueSnapshot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Format version written into documents and records
pub const SERIAL_VERSION: u32 = 2;

/// Persisted form of one entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    pub version: u32,
    pub id: Uuid,
    pub kind: EntryKind,
    pub source: SourceMeta,
    #[serde(default)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub from_playlist: bool,
}

impl From<&Entry> for EntryRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            version: SERIAL_VERSION,
            id: entry.id(),
            kind: entry.kind(),
            source: entry.source().clone(),
            meta: entry.meta().clone(),
            from_playlist: entry.from_playlist(),
        }
    }
}

impl From<EntryRecord> for Entry {
    fn from(record: EntryRecord) -> Self {
        Entry::with_id(
            record.id,
            record.kind,
            record.source,
            record.meta,
            record.from_playlist,
        )
    }
}

#[derive(Debug, Serialize)]
struct QueueDocument {
    version: u32,
    entries: Vec<EntryRecord>,
}

/// Records are kept as raw JSON so one bad record does not spoil the rest
#[derive(Debug, Deserialize)]
struct RawQueueDocument {
    version: u32,
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Serialize entries, head first
pub fn encode<'a>(entries: impl IntoIterator<Item = &'a Arc<Entry>>) -> Result<String> {
    let document = QueueDocument {
        version: SERIAL_VERSION,
        entries: entries.into_iter().map(|e| EntryRecord::from(e.as_ref())).collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Restore entries from a serialized queue
///
/// Records that are malformed or carry another version are skipped with a
/// warning.
///
/// # Errors
///
/// * `Error::Serialization` - not a JSON queue document
/// * `Error::Persistence` - document written by an incompatible version
pub fn decode(json: &str) -> Result<Vec<Entry>> {
    let document: RawQueueDocument = serde_json::from_str(json)?;
    if document.version != SERIAL_VERSION {
        return Err(Error::Persistence(format!(
            "Unsupported queue version {} (expected {})",
            document.version, SERIAL_VERSION
        )));
    }

    let mut entries = Vec::with_capacity(document.entries.len());
    for (index, value) in document.entries.into_iter().enumerate() {
        match serde_json::from_value::<EntryRecord>(value) {
            Ok(record) if record.version == SERIAL_VERSION => entries.push(record.into()),
            Ok(record) => warn!(
                "Skipping queued entry {} with unsupported version {}",
                index, record.version
            ),
            Err(e) => warn!("Skipping malformed queued entry {}: {}", index, e),
        }
    }

    Ok(entries)
}

/// File-backed queue storage
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the queue atomically (temp file + rename)
    pub async fn save(&self, entries: &[Arc<Entry>]) -> Result<()> {
        let json = encode(entries)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Saved {} queued entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Read the stored queue; a missing file is an empty queue
    pub async fn load(&self) -> Result<Vec<Entry>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored queue at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let entries = decode(&json)?;
        info!("Loaded {} queued entries from {}", entries.len(), self.path.display());
        Ok(entries)
    }
}

/// Whether an addition by this entry is worth saving
fn attributed(entry: &Entry) -> bool {
    entry.meta().author.is_some() && entry.meta().channel.is_some()
}

/// Queue contents to write in response to `event`, if any
fn contents_to_save(event: QueueEvent) -> Option<QueueSnapshot> {
    match event {
        QueueEvent::EntryAdded {
            entry,
            defer_serialize: false,
            snapshot,
            ..
        } if attributed(&entry) => Some(snapshot),
        QueueEvent::EntryAdded { .. } => None,
        QueueEvent::BatchCompleted { last, snapshot, .. } if attributed(&last) => Some(snapshot),
        QueueEvent::BatchCompleted { .. } => None,
        QueueEvent::EntryRemoved { snapshot, .. }
        | QueueEvent::EntryFailed { snapshot, .. }
        | QueueEvent::EntryTaken { snapshot, .. } => Some(snapshot),
        QueueEvent::QueueCleared { .. } => Some(Arc::from(Vec::<Arc<Entry>>::new())),
    }
}

/// Keep the stored queue in step with the live one
///
/// Saves after every removal, pop, failure and clear. Additions are saved
/// once a batch is complete (`defer_serialize` unset, or `batch-completed`)
/// and only for entries carrying both an author and a channel. The task ends
/// when the event bus closes.
pub fn spawn_persister(
    store: QueueStore,
    mut rx: broadcast::Receiver<QueueEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = event.name();
                    if let Some(snapshot) = contents_to_save(event) {
                        debug!("Saving queue after {}", name);
                        if let Err(e) = store.save(&snapshot).await {
                            error!("Failed to save queue to {}: {}", store.path().display(), e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Queue persister lagged, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("Queue event bus closed, persister stopping");
                    break;
                }
            }
        }
    })
}
