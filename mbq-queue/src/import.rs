//! Import validation
//!
//! Turns resolved source descriptions into queue entries. Collections are
//! expanded item by item; items that fail validation are counted and
//! skipped, never aborting the rest of the import.

use crate::entry::{Entry, EntryKind, EntryMeta, SourceMeta};
use crate::error::{Error, Result};
use crate::permissions::PermissionLookup;
use crate::queue::Queue;
use crate::source::SourceInfo;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extractors that hand back a raw HTTP resource instead of platform metadata
const RAW_EXTRACTORS: &[&str] = &["generic", "Dropbox"];

const GENERIC_EXTRACTOR: &str = "generic";
const TWITCH_STREAM_EXTRACTOR: &str = "twitch:stream";
const UNTITLED: &str = "Untitled";

/// Where and how an entry is added
#[derive(Debug, Clone, Copy, Default)]
struct Placement {
    at_head: bool,
    defer_serialize: bool,
    from_playlist: bool,
}

/// Result of importing one source description
#[derive(Debug)]
pub struct ImportOutcome {
    /// Entries added, in source order
    pub entries: Vec<Arc<Entry>>,
    /// 1-based queue position of the first added entry at import time
    pub position: usize,
    /// Items skipped by validation or failing to enqueue
    pub bad_items: usize,
}

/// Validates sources against contributor limits and enqueues them
pub struct ImportValidator {
    permissions: Arc<dyn PermissionLookup>,
}

impl ImportValidator {
    pub fn new(permissions: Arc<dyn PermissionLookup>) -> Self {
        Self { permissions }
    }

    /// Import a source: a stream, a single item, or a whole collection
    ///
    /// Single items and streams report their errors directly. Collection
    /// items that fail are counted in `bad_items` instead. An item whose
    /// platform id equals `skip_id` is skipped (it was already queued by the
    /// caller).
    pub fn import_from_source(
        &self,
        queue: &mut Queue,
        source: &SourceInfo,
        at_head: bool,
        skip_id: Option<&str>,
        meta: &EntryMeta,
    ) -> Result<ImportOutcome> {
        if source.is_stream() {
            let (entry, position) = self.enqueue_stream(queue, source, at_head, meta)?;
            return Ok(ImportOutcome {
                entries: vec![entry],
                position,
                bad_items: 0,
            });
        }

        if !source.is_collection() {
            let (entry, position) = self.enqueue_item(queue, source, at_head, meta)?;
            return Ok(ImportOutcome {
                entries: vec![entry],
                position,
                bad_items: 0,
            });
        }

        let position = if at_head { 1 } else { queue.len() + 1 };
        let max_length = meta
            .contributor()
            .and_then(|id| self.permissions.max_song_length(id));

        let total = source.items().len();
        if total < source.expected_count() {
            debug!(
                "Collection {} lists {} of {} items",
                source.title,
                total,
                source.expected_count()
            );
        }
        let mut ordered: Vec<(usize, &SourceInfo)> =
            source.items().iter().enumerate().map(|(i, item)| (i + 1, item)).collect();
        if at_head {
            ordered.reverse();
        }

        let mut entries: Vec<Arc<Entry>> = Vec::with_capacity(total);
        let mut bad_items = 0;
        let mut final_item_added = false;

        for (counter, (number, item)) in ordered.into_iter().enumerate() {
            let counter = counter + 1;
            final_item_added = false;

            if skip_id.is_some_and(|skip| !skip.is_empty() && item.id == skip) {
                debug!("Skipping already queued item {}", item.id);
                bad_items += 1;
                continue;
            }

            if let (Some(max), Some(duration)) = (max_length, item.duration()) {
                if duration > max {
                    debug!(
                        "Ignoring item {} from {:?}, duration {:?} exceeds permitted {:?}",
                        item.id,
                        meta.author.as_ref().map(|a| a.name.as_str()),
                        duration,
                        max
                    );
                    bad_items += 1;
                    continue;
                }
            }

            if item.is_unavailable() {
                debug!("Ignoring unavailable item {} ({})", item.id, item.title);
                bad_items += 1;
                continue;
            }

            let named;
            let item = if item.title.is_empty() && !source.title.is_empty() {
                named = SourceInfo {
                    title: format!("{} - #{}", source.title, number),
                    ..item.clone()
                };
                &named
            } else {
                item
            };

            let placement = Placement {
                at_head,
                defer_serialize: counter < total,
                from_playlist: true,
            };
            match self.add_item(queue, item, placement, meta) {
                Ok((entry, _)) => {
                    entries.push(entry);
                    final_item_added = true;
                }
                Err(e) => {
                    bad_items += 1;
                    warn!("Could not add item {}: {}", item.playable_url(), e);
                    debug!("Item: {:?}", item);
                }
            }
        }

        if bad_items > 0 {
            info!("Skipped {} bad entries", bad_items);
        }

        // Every addition was deferred when the final item was bad
        if !final_item_added {
            if let Some(last) = entries.last() {
                queue.complete_batch(Arc::clone(last));
            }
        }

        if at_head {
            entries.reverse();
        }

        Ok(ImportOutcome {
            entries,
            position,
            bad_items,
        })
    }

    /// Validate and enqueue a single item
    ///
    /// Returns the entry and its 1-based queue position.
    ///
    /// # Errors
    ///
    /// * `Error::WrongEntryType` - the source is a collection
    /// * `Error::Extraction` - the resource is not playable media
    pub fn enqueue_item(
        &self,
        queue: &mut Queue,
        info: &SourceInfo,
        at_head: bool,
        meta: &EntryMeta,
    ) -> Result<(Arc<Entry>, usize)> {
        let placement = Placement {
            at_head,
            ..Default::default()
        };
        self.add_item(queue, info, placement, meta)
    }

    /// Enqueue a live stream
    ///
    /// # Errors
    ///
    /// `Error::Extraction` if the source does not look like a stream.
    pub fn enqueue_stream(
        &self,
        queue: &mut Queue,
        info: &SourceInfo,
        at_head: bool,
        meta: &EntryMeta,
    ) -> Result<(Arc<Entry>, usize)> {
        let placement = Placement {
            at_head,
            ..Default::default()
        };
        self.add_stream(queue, info, placement, meta)
    }

    fn add_item(
        &self,
        queue: &mut Queue,
        info: &SourceInfo,
        placement: Placement,
        meta: &EntryMeta,
    ) -> Result<(Arc<Entry>, usize)> {
        if info.is_collection() {
            return Err(Error::WrongEntryType {
                message: "This is a playlist.".to_string(),
                is_playlist: true,
                use_url: info
                    .webpage_url
                    .clone()
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| info.url.clone()),
            });
        }

        if info.is_stream() {
            debug!("Item appears to be a stream, adding stream entry");
            return self.add_stream(queue, info, placement, meta);
        }

        if RAW_EXTRACTORS.contains(&info.extractor.as_str()) {
            if let Some(content_type) = info.content_type() {
                if content_type.starts_with("application/") || content_type.starts_with("image/") {
                    if !content_type.contains("/ogg") && !content_type.contains("/octet-stream") {
                        return Err(Error::Extraction(format!(
                            "Invalid content type \"{}\" for url {}",
                            content_type, info.url
                        )));
                    }
                } else if content_type.starts_with("text/html")
                    && info.extractor == GENERIC_EXTRACTOR
                {
                    warn!("Got text/html for content-type, this might be a stream");
                    return self.add_stream(queue, info, placement, meta);
                } else if !content_type.starts_with("audio/") && !content_type.starts_with("video/")
                {
                    warn!(
                        "Questionable content-type \"{}\" for url {}",
                        content_type, info.url
                    );
                }
            }
        }

        let title = if info.title.is_empty() {
            UNTITLED.to_string()
        } else {
            info.title.clone()
        };

        let entry = Arc::new(Entry::new(
            EntryKind::Download,
            SourceMeta {
                url: info.playable_url(),
                title,
                duration_secs: info.duration().map(|d| d.as_secs_f64()),
                source_id: Some(info.id.clone()).filter(|id| !id.is_empty()),
                thumbnail_url: info.thumbnail.clone(),
                expected_filename: info.expected_filename.clone(),
            },
            meta.clone(),
            placement.from_playlist,
        ));

        let index = queue.add_entry(
            Arc::clone(&entry),
            placement.at_head,
            placement.defer_serialize,
        )?;
        Ok((entry, index + 1))
    }

    fn add_stream(
        &self,
        queue: &mut Queue,
        info: &SourceInfo,
        placement: Placement,
        meta: &EntryMeta,
    ) -> Result<(Arc<Entry>, usize)> {
        if !info.is_stream() && info.is_live.is_none() && info.extractor != GENERIC_EXTRACTOR {
            return Err(Error::Extraction("This is not a stream.".to_string()));
        }

        let url = if info.url.is_empty() {
            info.playable_url()
        } else {
            info.url.clone()
        };

        let title = match info.description.as_deref() {
            Some(description) if info.extractor == TWITCH_STREAM_EXTRACTOR => {
                description.to_string()
            }
            _ if info.title.is_empty() => UNTITLED.to_string(),
            _ => info.title.clone(),
        };

        let entry = Arc::new(Entry::new(
            EntryKind::Stream,
            SourceMeta {
                url,
                title,
                duration_secs: None,
                source_id: Some(info.id.clone()).filter(|id| !id.is_empty()),
                thumbnail_url: info.thumbnail.clone(),
                expected_filename: None,
            },
            meta.clone(),
            placement.from_playlist,
        ));

        let index = queue.add_entry(
            Arc::clone(&entry),
            placement.at_head,
            placement.defer_serialize,
        )?;
        Ok((entry, index + 1))
    }
}
