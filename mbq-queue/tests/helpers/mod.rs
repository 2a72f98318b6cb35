//! Test helper modules for mbq-queue integration tests
//!
//! - ScriptedResolver: readiness resolver with scripted failures and delays
//! - fixtures: entry and source description builders

#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod scripted_resolver;

pub use fixtures::{collection, download_entry, item, meta_for, queue_with};
pub use scripted_resolver::ScriptedResolver;
