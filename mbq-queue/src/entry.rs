//! Queue entries
//!
//! An `Entry` is one playable item. Its identity and metadata never change
//! after construction; only its readiness moves through
//! `Pending → Resolving → Ready | Failed`.
//!
//! Readiness is single-flight: the first caller of [`Entry::ready`] starts the
//! resolution and every concurrent or later caller receives the same outcome.

use crate::error::{Error, Result};
use crate::resolver::ReadinessResolver;
use mbq_common::time::secs_to_duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity of the person who requested an entry
pub type ContributorId = u64;

/// Which resolution path an entry takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Downloaded on demand into a local file
    Download,
    /// Played directly from a live stream
    Stream,
}

/// Reference to an external object (user, channel) by id and display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRef {
    pub id: u64,
    pub name: String,
}

impl MetaRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Caller-supplied metadata attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Who requested the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<MetaRef>,

    /// Where playback notices for this entry go
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<MetaRef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, String>,
}

impl EntryMeta {
    pub fn with_author(author: MetaRef) -> Self {
        Self {
            author: Some(author),
            ..Default::default()
        }
    }

    pub fn contributor(&self) -> Option<ContributorId> {
        self.author.as_ref().map(|a| a.id)
    }
}

/// Source metadata of an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub url: String,
    pub title: String,

    /// Length in seconds, None when unknown
    #[serde(default)]
    pub duration_secs: Option<f64>,

    /// Identifier of the item on its platform
    #[serde(default)]
    pub source_id: Option<String>,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    /// Cache file name the media backend stores the download under
    #[serde(default)]
    pub expected_filename: Option<String>,
}

impl SourceMeta {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.and_then(secs_to_duration)
    }
}

/// A locally usable playback resource
#[derive(Debug, Clone, PartialEq)]
pub enum PlayableMedia {
    File {
        path: PathBuf,
        size_bytes: u64,
        /// Length discovered by inspecting the file
        duration: Option<Duration>,
    },
    Stream {
        url: String,
    },
}

impl PlayableMedia {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            PlayableMedia::File { duration, .. } => *duration,
            PlayableMedia::Stream { .. } => None,
        }
    }

    /// Path or URL the player opens
    pub fn location(&self) -> String {
        match self {
            PlayableMedia::File { path, .. } => path.display().to_string(),
            PlayableMedia::Stream { url } => url.clone(),
        }
    }
}

/// Observable readiness of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Resolving,
    Ready,
    Failed(String),
}

type ReadyOutcome = std::result::Result<Arc<PlayableMedia>, String>;

#[derive(Debug, Default)]
struct Readiness {
    outcome: OnceCell<ReadyOutcome>,
    resolving: AtomicBool,
}

/// Clears the in-flight flag when a resolution finishes or is dropped
struct ResolvingGuard<'a>(&'a AtomicBool);

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One playable item tracked by the queue
#[derive(Debug)]
pub struct Entry {
    id: Uuid,
    kind: EntryKind,
    source: SourceMeta,
    meta: EntryMeta,
    from_playlist: bool,
    readiness: Readiness,
}

impl Entry {
    /// Create a new entry with a fresh identifier
    pub fn new(kind: EntryKind, source: SourceMeta, meta: EntryMeta, from_playlist: bool) -> Self {
        Self::with_id(Uuid::new_v4(), kind, source, meta, from_playlist)
    }

    /// Create an entry with a known identifier (restoring persisted state)
    pub fn with_id(
        id: Uuid,
        kind: EntryKind,
        source: SourceMeta,
        meta: EntryMeta,
        from_playlist: bool,
    ) -> Self {
        Self {
            id,
            kind,
            source,
            meta,
            from_playlist,
            readiness: Readiness::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }

    pub fn source(&self) -> &SourceMeta {
        &self.source
    }

    pub fn url(&self) -> &str {
        &self.source.url
    }

    pub fn title(&self) -> &str {
        &self.source.title
    }

    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    pub fn contributor(&self) -> Option<ContributorId> {
        self.meta.contributor()
    }

    /// Entry came from expanding a playlist
    pub fn from_playlist(&self) -> bool {
        self.from_playlist
    }

    /// Title for log lines, falling back to the URL
    pub fn display_name(&self) -> &str {
        if self.source.title.is_empty() {
            &self.source.url
        } else {
            &self.source.title
        }
    }

    /// Known duration
    ///
    /// Uses the source metadata when available, otherwise whatever a
    /// successful resolution discovered.
    pub fn duration(&self) -> Option<Duration> {
        self.source
            .duration()
            .or_else(|| self.media().and_then(|m| m.duration()))
    }

    pub fn readiness(&self) -> ReadyState {
        match self.readiness.outcome.get() {
            Some(Ok(_)) => ReadyState::Ready,
            Some(Err(message)) => ReadyState::Failed(message.clone()),
            None if self.readiness.resolving.load(Ordering::Acquire) => ReadyState::Resolving,
            None => ReadyState::Pending,
        }
    }

    /// Resolved media, if resolution already succeeded
    pub fn media(&self) -> Option<Arc<PlayableMedia>> {
        match self.readiness.outcome.get() {
            Some(Ok(media)) => Some(Arc::clone(media)),
            _ => None,
        }
    }

    /// Wait until the entry is playable
    ///
    /// Starts resolution on first call; concurrent callers share the
    /// in-flight resolution and later callers get the stored outcome.
    ///
    /// # Errors
    ///
    /// Returns `Error::Extraction` when resolution failed.
    pub async fn ready(&self, resolver: &dyn ReadinessResolver) -> Result<Arc<PlayableMedia>> {
        let outcome = self
            .readiness
            .outcome
            .get_or_init(|| self.resolve(resolver))
            .await;
        outcome.clone().map_err(Error::Extraction)
    }

    async fn resolve(&self, resolver: &dyn ReadinessResolver) -> ReadyOutcome {
        self.readiness.resolving.store(true, Ordering::Release);
        let _guard = ResolvingGuard(&self.readiness.resolving);

        debug!("Resolving entry {} ({})", self.id, self.display_name());
        let result = match self.kind {
            EntryKind::Download => resolver.resolve_download(self).await,
            EntryKind::Stream => resolver.resolve_stream(self).await,
        };

        match result {
            Ok(media) => {
                debug!("Entry {} ready at {}", self.id, media.location());
                Ok(Arc::new(media))
            }
            Err(e) => {
                warn!("Could not resolve entry {} ({}): {}", self.id, self.display_name(), e);
                Err(e.resolution_message())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReadinessResolver for CountingResolver {
        async fn resolve_download(&self, entry: &Entry) -> Result<PlayableMedia> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(Error::Extraction(format!("{} is gone", entry.url())));
            }
            Ok(PlayableMedia::File {
                path: PathBuf::from("/cache/a.opus"),
                size_bytes: 1024,
                duration: Some(Duration::from_secs(42)),
            })
        }
    }

    fn resolver(fail: bool) -> CountingResolver {
        CountingResolver {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    fn download_entry(duration_secs: Option<f64>) -> Entry {
        Entry::new(
            EntryKind::Download,
            SourceMeta {
                url: "https://example.com/a".to_string(),
                title: "A".to_string(),
                duration_secs,
                ..Default::default()
            },
            EntryMeta::default(),
            false,
        )
    }

    #[tokio::test]
    async fn test_new_entry_is_pending() {
        let entry = download_entry(Some(10.0));
        assert_eq!(entry.readiness(), ReadyState::Pending);
        assert!(entry.media().is_none());
    }

    #[tokio::test]
    async fn test_ready_resolves_once_for_concurrent_callers() {
        let entry = download_entry(None);
        let resolver = resolver(false);

        let results =
            futures::future::join_all((0..8).map(|_| entry.ready(&resolver))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.readiness(), ReadyState::Ready);

        // A later caller gets the stored result without a new resolution
        entry.ready(&resolver).await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_shared() {
        let entry = download_entry(None);
        let resolver = resolver(true);

        let first = entry.ready(&resolver).await;
        let second = entry.ready(&resolver).await;

        assert!(matches!(first, Err(Error::Extraction(ref m)) if m.contains("is gone")));
        assert!(matches!(second, Err(Error::Extraction(_))));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(entry.readiness(), ReadyState::Failed(_)));
    }

    #[tokio::test]
    async fn test_resolving_state_visible_while_in_flight() {
        let entry = Arc::new(download_entry(None));
        let resolver = Arc::new(resolver(false));

        let task = {
            let entry = Arc::clone(&entry);
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { entry.ready(resolver.as_ref()).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(entry.readiness(), ReadyState::Resolving);

        task.await.unwrap().unwrap();
        assert_eq!(entry.readiness(), ReadyState::Ready);
    }

    #[tokio::test]
    async fn test_cancelled_resolution_returns_to_pending() {
        let entry = download_entry(None);
        let resolver = resolver(false);

        let attempt =
            tokio::time::timeout(Duration::from_millis(5), entry.ready(&resolver)).await;
        assert!(attempt.is_err());
        assert_eq!(entry.readiness(), ReadyState::Pending);

        // A fresh request starts over
        entry.ready(&resolver).await.unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duration_falls_back_to_resolved_media() {
        let entry = download_entry(None);
        assert_eq!(entry.duration(), None);

        entry.ready(&resolver(false)).await.unwrap();
        assert_eq!(entry.duration(), Some(Duration::from_secs(42)));

        let known = download_entry(Some(10.0));
        known.ready(&resolver(false)).await.unwrap();
        assert_eq!(known.duration(), Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_stream_uses_default_resolution() {
        let entry = Entry::new(
            EntryKind::Stream,
            SourceMeta {
                url: "https://radio.example/live".to_string(),
                title: "Radio".to_string(),
                ..Default::default()
            },
            EntryMeta::default(),
            false,
        );
        let resolver = resolver(true);

        let media = entry.ready(&resolver).await.unwrap();
        assert_eq!(
            *media,
            PlayableMedia::Stream {
                url: "https://radio.example/live".to_string()
            }
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_display_name_falls_back_to_url() {
        let entry = Entry::new(
            EntryKind::Download,
            SourceMeta {
                url: "https://example.com/x".to_string(),
                ..Default::default()
            },
            EntryMeta::default(),
            false,
        );
        assert_eq!(entry.display_name(), "https://example.com/x");
    }
}
