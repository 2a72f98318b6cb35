//! Entry readiness resolution
//!
//! The queue never talks to a media backend directly. It asks a
//! `ReadinessResolver` to turn an entry into a `PlayableMedia`, and
//! [`Entry::ready`](crate::entry::Entry::ready) makes sure that happens at
//! most once per entry.

use crate::entry::{Entry, PlayableMedia};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolver trait - turns entry metadata into a playable resource
#[async_trait]
pub trait ReadinessResolver: Send + Sync {
    /// Produce a local file for a downloadable entry
    ///
    /// # Returns
    /// * `Ok(PlayableMedia)` - Entry can be played
    /// * `Err(Error::Extraction)` - Entry cannot be played (skipped by the queue)
    async fn resolve_download(&self, entry: &Entry) -> Result<PlayableMedia>;

    /// Produce a stream handle for a stream entry
    ///
    /// Streams need no preparation: the URL itself is the handle.
    async fn resolve_stream(&self, entry: &Entry) -> Result<PlayableMedia> {
        Ok(PlayableMedia::Stream {
            url: entry.url().to_string(),
        })
    }
}

/// Resolves downloadable entries from a local media cache folder
///
/// Files are looked up by the entry's expected file name. A cached file
/// whose extension differs from the expected one is accepted, since the
/// backend may transcode on download.
#[derive(Debug, Clone)]
pub struct CacheResolver {
    cache_dir: PathBuf,
}

impl CacheResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Find a cached file for `file_name`, exact match first, then by stem
    async fn find_cached(&self, file_name: &OsStr) -> Result<Option<PathBuf>> {
        let exact = self.cache_dir.join(file_name);
        if tokio::fs::metadata(&exact).await.map(|m| m.is_file()).unwrap_or(false) {
            return Ok(Some(exact));
        }

        let stem = match Path::new(file_name).file_stem() {
            Some(stem) => stem.to_owned(),
            None => return Ok(None),
        };

        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(candidate) = dir.next_entry().await? {
            let path = candidate.path();
            if path.file_stem() == Some(stem.as_os_str())
                && candidate.file_type().await?.is_file()
            {
                warn!("Cached file {} has a different extension than expected", path.display());
                return Ok(Some(path));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl ReadinessResolver for CacheResolver {
    async fn resolve_download(&self, entry: &Entry) -> Result<PlayableMedia> {
        let expected = entry.source().expected_filename.as_deref().ok_or_else(|| {
            Error::Extraction(format!("No cache file name known for {}", entry.url()))
        })?;

        // Only the final path component is trusted
        let file_name = Path::new(expected).file_name().ok_or_else(|| {
            Error::Extraction(format!("Invalid cache file name {:?}", expected))
        })?;

        let path = self
            .find_cached(file_name)
            .await
            .map_err(|e| Error::Extraction(format!("Cache lookup failed: {}", e)))?
            .ok_or_else(|| {
                Error::Extraction(format!(
                    "{} is not in the media cache {}",
                    entry.url(),
                    self.cache_dir.display()
                ))
            })?;

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        debug!("Download cached at {} ({} bytes)", path.display(), size_bytes);

        Ok(PlayableMedia::File {
            path,
            size_bytes,
            duration: None,
        })
    }
}
