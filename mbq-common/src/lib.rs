//! # MBQ Common Library
//!
//! Shared code for the media bot queue crates:
//! - Error type used by configuration and I/O helpers
//! - Generic EventBus (tokio broadcast)
//! - TOML configuration loading and data folder resolution
//! - Time formatting helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
