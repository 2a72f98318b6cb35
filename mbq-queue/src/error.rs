//! Error types for mbq-queue
//!
//! Per-entry failures (`Extraction`, `WrongEntryType`) are recovered inside
//! the queue and the import validator. `InvalidData` and `OutOfBounds` are
//! returned to the caller of the specific query and leave the queue untouched.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for mbq-queue
#[derive(Error, Debug)]
pub enum Error {
    /// Media could not be turned into a playable resource
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A source resolved to an unexpected shape (e.g. a playlist where a
    /// single item was expected)
    #[error("Wrong entry type: {message}")]
    WrongEntryType {
        message: String,
        /// The source was a collection rather than a single item
        is_playlist: bool,
        /// URL to retry the request with
        use_url: String,
    },

    /// Not enough information to compute a derived value
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Index-addressed operation given an out-of-range index
    #[error("Index {index} out of bounds for queue of length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Entry is already queued
    #[error("Entry {0} is already in the queue")]
    DuplicateEntry(Uuid),

    /// Persisted queue could not be interpreted
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration and other shared errors
    #[error(transparent)]
    Common(#[from] mbq_common::Error),
}

impl Error {
    /// Message describing a failed resolution, without the variant prefix
    /// for extraction errors
    pub(crate) fn resolution_message(&self) -> String {
        match self {
            Error::Extraction(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Convenience Result type using mbq-queue Error
pub type Result<T> = std::result::Result<T, Error>;
