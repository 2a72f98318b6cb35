//! Readiness resolver driven by a script of failing URLs

use async_trait::async_trait;
use mbq_queue::{Entry, Error, PlayableMedia, ReadinessResolver, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Resolves every download to a fake cache path unless its URL is scripted
/// to fail. Records the URL of every resolution it performs.
#[derive(Default)]
pub struct ScriptedResolver {
    failing: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail resolution of entries with this URL
    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// Sleep this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// URLs resolved so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl ReadinessResolver for ScriptedResolver {
    async fn resolve_download(&self, entry: &Entry) -> Result<PlayableMedia> {
        self.calls.lock().unwrap().push(entry.url().to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.contains(entry.url()) {
            return Err(Error::Extraction(format!("{} could not be downloaded", entry.url())));
        }

        Ok(PlayableMedia::File {
            path: PathBuf::from("/cache").join(entry.title()),
            size_bytes: 1024,
            duration: None,
        })
    }
}
