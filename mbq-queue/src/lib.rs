//! # Media Playback Queue Library (mbq-queue)
//!
//! Ordered queue of playable entries with contributor fairness, background
//! prefetch of the head entry, and recovery from entries that fail to become
//! ready.
//!
//! **Architecture:** `ImportValidator` turns resolved sources into `Entry`s,
//! `Queue` orders them and publishes `QueueEvent`s, and a
//! `ReadinessResolver` turns the head entry into playable media.

pub mod entry;
pub mod error;
pub mod events;
pub mod import;
pub mod permissions;
pub mod persistence;
pub mod queue;
pub mod resolver;
pub mod source;

pub use entry::{
    ContributorId, Entry, EntryKind, EntryMeta, MetaRef, PlayableMedia, ReadyState, SourceMeta,
};
pub use error::{Error, Result};
pub use events::{QueueEvent, QueueEventBus};
pub use import::{ImportOutcome, ImportValidator};
pub use permissions::{PermissionLookup, PermissionTable};
pub use persistence::QueueStore;
pub use queue::{NowPlaying, Queue};
pub use resolver::{CacheResolver, ReadinessResolver};
pub use source::SourceInfo;
