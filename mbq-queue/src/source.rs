//! Resolved source descriptions
//!
//! `SourceInfo` is the already-extracted metadata handed to the import
//! validator by the media backend. Field names follow the extractor JSON so
//! a backend response deserializes directly.

use mbq_common::time::secs_to_duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Titles some platforms report in place of removed playlist items
const UNAVAILABLE_TITLES: &[&str] = &["[Deleted video]", "[Private video]"];

/// Shape of a resolved source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A single playable item
    #[default]
    #[serde(alias = "video", alias = "url")]
    Item,

    /// An expandable collection of items
    #[serde(alias = "playlist")]
    Collection,

    /// A live stream
    Stream,
}

/// Platform-reported availability of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Public,
    Unlisted,
    Private,
    PremiumOnly,
    SubscriberOnly,
    NeedsAuth,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// Metadata describing one source: a single item, a collection or a stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(rename = "_type", default)]
    pub kind: SourceKind,

    /// Stable per-item identifier on the originating platform
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Length in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub webpage_url: Option<String>,

    /// Name of the extractor that produced this description
    #[serde(default)]
    pub extractor: String,

    #[serde(default)]
    pub is_live: Option<bool>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub thumbnail: Option<String>,

    #[serde(default)]
    pub availability: Option<Availability>,

    /// Number of items the platform reports for a collection
    #[serde(default)]
    pub playlist_count: Option<usize>,

    /// Constituent items of a collection, in source order
    #[serde(default)]
    pub entries: Vec<SourceInfo>,

    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,

    /// File name the media backend will store the download under
    #[serde(default, alias = "__expected_filename")]
    pub expected_filename: Option<String>,
}

impl SourceInfo {
    pub fn is_collection(&self) -> bool {
        self.kind == SourceKind::Collection
    }

    /// Bare stream, or flagged live by the platform
    pub fn is_stream(&self) -> bool {
        self.kind == SourceKind::Stream || self.is_live == Some(true)
    }

    /// Constituent items of a collection
    pub fn items(&self) -> &[SourceInfo] {
        &self.entries
    }

    /// Total number of items the collection is expected to hold
    pub fn expected_count(&self) -> usize {
        self.playlist_count.unwrap_or(self.entries.len())
    }

    /// Known duration; zero or missing means unknown
    pub fn duration(&self) -> Option<Duration> {
        self.duration.and_then(secs_to_duration)
    }

    /// Value of the `content-type` response header, matched case-insensitively
    pub fn content_type(&self) -> Option<&str> {
        self.http_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// URL to hand to the media backend
    ///
    /// Single items prefer the page URL; everything else prefers the
    /// direct URL.
    pub fn playable_url(&self) -> String {
        let webpage = self.webpage_url.as_deref().filter(|u| !u.is_empty());
        let direct = Some(self.url.as_str()).filter(|u| !u.is_empty());

        let preferred = if self.kind == SourceKind::Item {
            webpage.or(direct)
        } else {
            direct.or(webpage)
        };
        preferred.unwrap_or_default().to_string()
    }

    /// The platform reports this item as private or deleted
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.availability,
            Some(Availability::Private) | Some(Availability::Deleted)
        ) || UNAVAILABLE_TITLES.contains(&self.title.as_str())
    }
}
