//! Entry and source description builders

use mbq_common::config::QueueSettings;
use mbq_queue::{
    Entry, EntryKind, EntryMeta, MetaRef, Queue, QueueEventBus, ReadinessResolver, SourceInfo,
    SourceMeta,
};
use mbq_queue::source::SourceKind;
use std::sync::Arc;

/// Queue over `resolver` with a roomy event bus
pub fn queue_with(resolver: Arc<dyn ReadinessResolver>, settings: QueueSettings) -> Queue {
    Queue::new(resolver, QueueEventBus::new(256), settings)
}

/// Metadata naming a contributor and a channel
pub fn meta_for(author: u64) -> EntryMeta {
    EntryMeta {
        author: Some(MetaRef::new(author, format!("user{}", author))),
        channel: Some(MetaRef::new(900, "music")),
        ..Default::default()
    }
}

/// Downloadable entry whose URL is derived from its title
pub fn download_entry(title: &str, duration_secs: Option<f64>, meta: EntryMeta) -> Arc<Entry> {
    Arc::new(Entry::new(
        EntryKind::Download,
        SourceMeta {
            url: format!("https://media.example/{}", title),
            title: title.to_string(),
            duration_secs,
            source_id: Some(title.to_string()),
            ..Default::default()
        },
        meta,
        false,
    ))
}

/// Single item description
pub fn item(id: &str, title: &str, duration: Option<f64>) -> SourceInfo {
    SourceInfo {
        kind: SourceKind::Item,
        id: id.to_string(),
        title: title.to_string(),
        duration,
        url: format!("https://cdn.example/{}.m4a", id),
        webpage_url: Some(format!("https://media.example/watch?v={}", id)),
        extractor: "youtube".to_string(),
        expected_filename: Some(format!("{}.m4a", id)),
        ..Default::default()
    }
}

/// Collection description holding `items`
pub fn collection(title: &str, items: Vec<SourceInfo>) -> SourceInfo {
    SourceInfo {
        kind: SourceKind::Collection,
        id: "PL1".to_string(),
        title: title.to_string(),
        url: "https://media.example/playlist?list=PL1".to_string(),
        extractor: "youtube:tab".to_string(),
        playlist_count: Some(items.len()),
        entries: items,
        ..Default::default()
    }
}
