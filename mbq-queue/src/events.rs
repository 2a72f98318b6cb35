//! Queue events
//!
//! The queue publishes every mutation on an `EventBus<QueueEvent>`.
//! Listeners (the persister, a now-playing notifier) subscribe without the
//! queue knowing about them. Delivery order matches call order.

use crate::entry::Entry;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use mbq_common::events::EventBus;

/// Ordered view of the queue at the time an event was emitted
pub type QueueSnapshot = Arc<[Arc<Entry>]>;

/// Bus carrying queue events
pub type QueueEventBus = EventBus<QueueEvent>;

/// Queue mutation notifications
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Entry added to the queue
    EntryAdded {
        entry: Arc<Entry>,
        /// Index of the entry after insertion (0 = head)
        position: usize,
        /// More additions from the same batch follow; persistence may wait
        defer_serialize: bool,
        /// Queue contents after the addition
        snapshot: QueueSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Entry removed by index
    EntryRemoved {
        entry: Arc<Entry>,
        index: usize,
        /// Queue contents after the removal
        snapshot: QueueSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Entry could not become ready and was skipped
    EntryFailed {
        entry: Arc<Entry>,
        error: String,
        /// Queue contents after the entry was popped
        snapshot: QueueSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Entry popped and ready to play
    EntryTaken {
        entry: Arc<Entry>,
        /// Queue contents after the entry was popped
        snapshot: QueueSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// A batch ended on an item that was not added, so no addition of the
    /// batch went out with `defer_serialize` unset
    BatchCompleted {
        /// Final entry the batch added
        last: Arc<Entry>,
        snapshot: QueueSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Queue emptied
    QueueCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::EntryAdded { .. } => "entry-added",
            QueueEvent::EntryRemoved { .. } => "entry-removed",
            QueueEvent::EntryFailed { .. } => "entry-failed",
            QueueEvent::EntryTaken { .. } => "entry-taken",
            QueueEvent::BatchCompleted { .. } => "batch-completed",
            QueueEvent::QueueCleared { .. } => "queue-cleared",
        }
    }

    /// Entry the event is about, if any
    pub fn entry(&self) -> Option<&Arc<Entry>> {
        match self {
            QueueEvent::EntryAdded { entry, .. }
            | QueueEvent::EntryRemoved { entry, .. }
            | QueueEvent::EntryFailed { entry, .. }
            | QueueEvent::EntryTaken { entry, .. }
            | QueueEvent::BatchCompleted { last: entry, .. } => Some(entry),
            QueueEvent::QueueCleared { .. } => None,
        }
    }
}
