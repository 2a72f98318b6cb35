//! Playback queue
//!
//! Ordered container of pending entries. Index 0 is the head, the entry that
//! plays next.
//!
//! **Ownership:** one queue per playback context, mutated from a single
//! task. Readiness resolution runs beside it: prefetch work is spawned onto
//! a `TaskTracker` owned by the queue, so `shutdown()` can cancel and await
//! it deterministically.
//!
//! **Prefetch policy:**
//! - An appended entry that lands at the head starts resolving immediately
//! - `take_next` starts resolving the new head while it waits for the
//!   popped entry

use crate::entry::{ContributorId, Entry, ReadyState};
use crate::error::{Error, Result};
use crate::events::{QueueEvent, QueueEventBus, QueueSnapshot};
use crate::resolver::ReadinessResolver;
use mbq_common::config::QueueSettings;
use mbq_common::time::now;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Entry currently playing outside the queue
#[derive(Debug, Clone, Copy)]
pub struct NowPlaying<'a> {
    pub entry: &'a Entry,
    /// Elapsed playback time
    pub progress: Duration,
}

/// Playback queue
pub struct Queue {
    entries: VecDeque<Arc<Entry>>,
    resolver: Arc<dyn ReadinessResolver>,
    events: QueueEventBus,
    settings: QueueSettings,
    prefetch_tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Queue {
    /// Create new empty queue
    pub fn new(
        resolver: Arc<dyn ReadinessResolver>,
        events: QueueEventBus,
        settings: QueueSettings,
    ) -> Self {
        Self {
            entries: VecDeque::new(),
            resolver,
            events,
            settings,
            prefetch_tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a queue holding restored entries
    ///
    /// No events are emitted and nothing is prefetched. Entries repeating an
    /// identifier already seen are dropped.
    pub fn from_entries(
        entries: impl IntoIterator<Item = Entry>,
        resolver: Arc<dyn ReadinessResolver>,
        events: QueueEventBus,
        settings: QueueSettings,
    ) -> Self {
        let mut queue = Self::new(resolver, events, settings);
        for entry in entries {
            if queue.contains(entry.id()) {
                warn!("Dropping duplicate restored entry {}", entry.id());
                continue;
            }
            queue.entries.push_back(Arc::new(entry));
        }
        debug!("Restored queue with {} entries", queue.entries.len());
        queue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate from head to tail
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry>> {
        self.entries.iter()
    }

    pub fn events(&self) -> &QueueEventBus {
        &self.events
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Current contents, head first
    pub fn snapshot(&self) -> QueueSnapshot {
        self.entries.iter().cloned().collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    /// Index of the entry with this identifier
    pub fn position_of(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    /// Add entry at the tail, or at the head when `at_head` is set
    ///
    /// Returns the index the entry ended up at.
    /// Must be called from within a tokio runtime (head prefetch is spawned).
    pub fn append(&mut self, entry: Arc<Entry>, at_head: bool) -> Result<usize> {
        self.add_entry(entry, at_head, false)
    }

    /// Add entry, telling listeners whether persistence may be deferred
    ///
    /// Batch imports pass `defer_serialize = true` for all but the last
    /// entry so the queue is written once per batch.
    pub fn add_entry(
        &mut self,
        entry: Arc<Entry>,
        at_head: bool,
        defer_serialize: bool,
    ) -> Result<usize> {
        if self.contains(entry.id()) {
            return Err(Error::DuplicateEntry(entry.id()));
        }

        if at_head {
            self.entries.push_front(Arc::clone(&entry));
        } else {
            self.entries.push_back(Arc::clone(&entry));
        }

        if self.settings.round_robin_queue {
            self.reorder_round_robin();
        }

        let position = match (self.settings.round_robin_queue, at_head) {
            (true, _) => self.position_of(entry.id()).unwrap_or_default(),
            (false, true) => 0,
            (false, false) => self.entries.len() - 1,
        };

        debug!(
            "Added entry {} ({}) at position {}",
            entry.id(),
            entry.display_name(),
            position
        );

        self.events.emit_lossy(QueueEvent::EntryAdded {
            entry: Arc::clone(&entry),
            position,
            defer_serialize,
            snapshot: self.snapshot(),
            timestamp: now(),
        });

        if position == 0 {
            self.prefetch(entry);
        }

        Ok(position)
    }

    /// Entry at `index` (0 = head)
    pub fn get_at(&self, index: usize) -> Result<&Arc<Entry>> {
        self.entries.get(index).ok_or(Error::OutOfBounds {
            index,
            len: self.entries.len(),
        })
    }

    /// Remove and return the entry at `index`
    ///
    /// An in-flight resolution of the removed entry is left to finish; its
    /// result is discarded with the entry.
    pub fn remove_at(&mut self, index: usize) -> Result<Arc<Entry>> {
        let len = self.entries.len();
        let entry = self
            .entries
            .remove(index)
            .ok_or(Error::OutOfBounds { index, len })?;

        debug!("Removed entry {} from position {}", entry.id(), index);
        self.events.emit_lossy(QueueEvent::EntryRemoved {
            entry: Arc::clone(&entry),
            index,
            snapshot: self.snapshot(),
            timestamp: now(),
        });

        Ok(entry)
    }

    /// Insert entry before `index`; `index == len()` inserts at the tail
    pub fn insert_at(&mut self, index: usize, entry: Arc<Entry>) -> Result<()> {
        let len = self.entries.len();
        if index > len {
            return Err(Error::OutOfBounds { index, len });
        }
        if self.contains(entry.id()) {
            return Err(Error::DuplicateEntry(entry.id()));
        }

        self.entries.insert(index, Arc::clone(&entry));

        debug!("Inserted entry {} at position {}", entry.id(), index);
        self.events.emit_lossy(QueueEvent::EntryAdded {
            entry,
            position: index,
            defer_serialize: false,
            snapshot: self.snapshot(),
            timestamp: now(),
        });

        Ok(())
    }

    /// Head entry without removing it
    pub fn peek_head(&self) -> Option<&Arc<Entry>> {
        self.entries.front()
    }

    /// Pop the next playable entry
    ///
    /// Entries that fail to become ready are reported as `entry-failed` and
    /// skipped. Returns None once the queue runs out.
    ///
    /// With `prefetch_next` set, the new head starts resolving in the
    /// background each time an entry is popped; this call does not wait for
    /// that prefetch. The flag holds for every skipped entry too: with it
    /// unset, entries behind a failing head are never prefetched, only
    /// resolved when popped.
    ///
    /// A played entry is announced as `entry-taken`.
    pub async fn take_next(&mut self, prefetch_next: bool) -> Option<Arc<Entry>> {
        while let Some(entry) = self.entries.pop_front() {
            if prefetch_next {
                if let Some(next) = self.entries.front() {
                    self.prefetch(Arc::clone(next));
                }
            }

            match entry.ready(self.resolver.as_ref()).await {
                Ok(media) => {
                    info!("Next entry: {} ({})", entry.display_name(), media.location());
                    self.events.emit_lossy(QueueEvent::EntryTaken {
                        entry: Arc::clone(&entry),
                        snapshot: self.snapshot(),
                        timestamp: now(),
                    });
                    return Some(entry);
                }
                Err(e) => {
                    warn!(
                        "Entry {} ({}) failed to become ready, moving to the next entry: {}",
                        entry.id(),
                        entry.display_name(),
                        e
                    );
                    self.events.emit_lossy(QueueEvent::EntryFailed {
                        entry,
                        error: e.to_string(),
                        snapshot: self.snapshot(),
                        timestamp: now(),
                    });
                }
            }
        }

        debug!("Queue exhausted");
        None
    }

    /// Announce the end of a batch whose final item was not added
    ///
    /// Every addition of such a batch went out with `defer_serialize` set;
    /// this tells listeners the batch is complete. `last` is the final entry
    /// the batch did add.
    pub fn complete_batch(&self, last: Arc<Entry>) {
        debug!("Batch completed after entry {}", last.id());
        self.events.emit_lossy(QueueEvent::BatchCompleted {
            last,
            snapshot: self.snapshot(),
            timestamp: now(),
        });
    }

    /// Randomize order in place
    pub fn shuffle(&mut self) {
        self.entries
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
        debug!("Shuffled {} entries", self.entries.len());
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();

        debug!("Cleared {} entries", removed);
        self.events.emit_lossy(QueueEvent::QueueCleared {
            removed,
            timestamp: now(),
        });
    }

    /// Interleave entries by contributor
    ///
    /// Contributors are visited in the order they first appear; each visit
    /// takes that contributor's next entry. Unattributed entries share one
    /// group. Each contributor's own entries keep their relative order.
    pub fn reorder_round_robin(&mut self) {
        let total = self.entries.len();
        let mut groups: Vec<(Option<ContributorId>, VecDeque<Arc<Entry>>)> = Vec::new();

        for entry in self.entries.drain(..) {
            let key = entry.contributor();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, pending)) => pending.push_back(entry),
                None => groups.push((key, VecDeque::from([entry]))),
            }
        }

        let mut reordered = VecDeque::with_capacity(total);
        while !groups.is_empty() {
            groups.retain_mut(|(_, pending)| {
                if let Some(entry) = pending.pop_front() {
                    reordered.push_back(entry);
                }
                !pending.is_empty()
            });
        }

        self.entries = reordered;
    }

    /// Estimate the wait until the entry at 1-based `position` starts
    ///
    /// Sums the durations of the entries ahead of it, plus the time left on
    /// the entry currently playing.
    ///
    /// # Errors
    ///
    /// `Error::InvalidData` if any counted entry (or the playing one) has no
    /// known duration, or the sum does not fit a `Duration`. Entries after
    /// `position` are not inspected.
    pub fn estimate_time_until(
        &self,
        position: usize,
        now_playing: Option<&NowPlaying<'_>>,
    ) -> Result<Duration> {
        let mut estimate = Duration::ZERO;

        for entry in self.entries.iter().take(position.saturating_sub(1)) {
            let duration = entry.duration().ok_or_else(|| {
                Error::InvalidData(format!("no duration data for {}", entry.display_name()))
            })?;
            estimate = estimate
                .checked_add(duration)
                .ok_or_else(|| Error::InvalidData("estimated wait overflows".to_string()))?;
        }

        if let Some(playing) = now_playing {
            let duration = playing.entry.duration().ok_or_else(|| {
                Error::InvalidData("no duration data in current entry".to_string())
            })?;
            estimate = estimate
                .checked_add(duration.saturating_sub(playing.progress))
                .ok_or_else(|| Error::InvalidData("estimated wait overflows".to_string()))?;
        }

        Ok(estimate)
    }

    /// Number of queued entries requested by `contributor`
    pub fn count_for_contributor(&self, contributor: ContributorId) -> usize {
        self.entries
            .iter()
            .filter(|e| e.contributor() == Some(contributor))
            .count()
    }

    /// First queued entry requested by `contributor`
    pub fn next_entry_for_contributor(&self, contributor: ContributorId) -> Option<&Arc<Entry>> {
        self.entries
            .iter()
            .find(|e| e.contributor() == Some(contributor))
    }

    /// Cancel outstanding prefetch work and wait for it to wind down
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.prefetch_tasks.close();
        self.prefetch_tasks.wait().await;
        debug!("Queue prefetch tasks stopped");
    }

    /// Start resolving `entry` in the background
    fn prefetch(&self, entry: Arc<Entry>) {
        if entry.readiness() != ReadyState::Pending || self.shutdown.is_cancelled() {
            return;
        }

        debug!("Prefetching entry {} ({})", entry.id(), entry.display_name());
        let resolver = Arc::clone(&self.resolver);
        let shutdown = self.shutdown.clone();

        self.prefetch_tasks.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Prefetch of entry {} cancelled", entry.id());
                }
                result = entry.ready(resolver.as_ref()) => {
                    if let Err(e) = result {
                        debug!("Prefetch of entry {} failed: {}", entry.id(), e);
                    }
                }
            }
        });
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
