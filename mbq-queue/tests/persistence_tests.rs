//! Queue Persistence Tests
//!
//! Codec round trips, tolerance of damaged records, the file store, and the
//! background persister.

mod helpers;

use helpers::{collection, download_entry, item, meta_for, ScriptedResolver};
use mbq_common::config::QueueSettings;
use mbq_queue::persistence::{decode, encode, spawn_persister, SERIAL_VERSION};
use mbq_queue::source::Availability;
use mbq_queue::{
    Entry, EntryKind, EntryMeta, Error, ImportValidator, MetaRef, PermissionTable, Queue,
    QueueEventBus, QueueStore, ReadyState, SourceMeta,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn sample_entries() -> Vec<Arc<Entry>> {
    let mut meta = meta_for(42);
    meta.flags.insert("requested_via".to_string(), "play".to_string());

    let stream = Arc::new(Entry::new(
        EntryKind::Stream,
        SourceMeta {
            url: "https://radio.example/live".to_string(),
            title: "Radio".to_string(),
            thumbnail_url: Some("https://radio.example/logo.png".to_string()),
            ..Default::default()
        },
        EntryMeta::default(),
        false,
    ));

    vec![
        download_entry("first", Some(215.5), meta),
        stream,
        download_entry("third", None, EntryMeta::default()),
    ]
}

#[tokio::test]
async fn test_round_trip_restores_metadata_and_order() {
    let entries = sample_entries();
    // Readiness must not survive a round trip
    entries[0].ready(&ScriptedResolver::new()).await.unwrap();

    let json = encode(&entries).unwrap();
    let restored = decode(&json).unwrap();

    assert_eq!(restored.len(), entries.len());
    for (before, after) in entries.iter().zip(&restored) {
        assert_eq!(after.id(), before.id());
        assert_eq!(after.kind(), before.kind());
        assert_eq!(after.source(), before.source());
        assert_eq!(after.meta(), before.meta());
        assert_eq!(after.from_playlist(), before.from_playlist());
        assert_eq!(after.readiness(), ReadyState::Pending);
    }
}

#[test]
fn test_damaged_records_are_skipped() {
    let entries = sample_entries();
    let json = encode(&entries).unwrap();

    let mut document: serde_json::Value = serde_json::from_str(&json).unwrap();
    let records = document["entries"].as_array_mut().unwrap();
    records[0]["version"] = serde_json::json!(SERIAL_VERSION + 1);
    records[1].as_object_mut().unwrap().remove("source");

    let restored = decode(&document.to_string()).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id(), entries[2].id());
}

#[test]
fn test_incompatible_document_is_rejected() {
    let result = decode(r#"{"version": 1, "entries": []}"#);
    assert!(matches!(result, Err(Error::Persistence(_))));

    let result = decode("not json");
    assert!(matches!(result, Err(Error::Serialization(_))));
}

#[tokio::test]
async fn test_store_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("guild").join("queue.json"));

    assert!(store.load().await.unwrap().is_empty());

    let entries = sample_entries();
    store.save(&entries).await.unwrap();

    assert!(store.path().exists());
    assert!(!temp_dir.path().join("guild").join("queue.json.tmp").exists());

    let loaded = store.load().await.unwrap();
    let ids: Vec<_> = loaded.iter().map(|e| e.id()).collect();
    let expected: Vec<_> = entries.iter().map(|e| e.id()).collect();
    assert_eq!(ids, expected);
}

async fn run_persister<F>(store: &QueueStore, mutate: F)
where
    F: FnOnce(&mut Queue),
{
    let bus = QueueEventBus::new(64);
    let handle = spawn_persister(store.clone(), bus.subscribe());

    let mut queue = Queue::new(
        Arc::new(ScriptedResolver::new()),
        bus.clone(),
        QueueSettings::default(),
    );
    mutate(&mut queue);
    queue.shutdown().await;
    drop(queue);
    drop(bus);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("persister should stop when the bus closes")
        .unwrap();
}

#[tokio::test]
async fn test_persister_waits_for_final_batch_addition() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("queue.json"));

    run_persister(&store, |queue| {
        queue.add_entry(download_entry("a", None, meta_for(1)), false, true).unwrap();
        queue.add_entry(download_entry("b", None, meta_for(1)), false, true).unwrap();
    })
    .await;
    assert!(!store.path().exists());

    run_persister(&store, |queue| {
        queue.add_entry(download_entry("a", None, meta_for(1)), false, true).unwrap();
        queue.add_entry(download_entry("b", None, meta_for(1)), false, false).unwrap();
    })
    .await;

    let saved = store.load().await.unwrap();
    let titles: Vec<&str> = saved.iter().map(|e| e.title()).collect();
    assert_eq!(titles, vec!["a", "b"]);
}

#[tokio::test]
async fn test_persister_ignores_entries_without_channel() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("queue.json"));

    run_persister(&store, |queue| {
        let meta = EntryMeta::with_author(MetaRef::new(1, "user1"));
        queue.append(download_entry("a", None, meta), false).unwrap();
    })
    .await;

    assert!(!store.path().exists());
}

fn saved_titles(entries: &[Entry]) -> Vec<&str> {
    entries.iter().map(|e| e.title()).collect()
}

#[tokio::test]
async fn test_persister_saves_batch_ending_with_bad_item() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("queue.json"));

    run_persister(&store, |queue| {
        let mut deleted = item("v3", "Three", None);
        deleted.availability = Some(Availability::Deleted);
        let source = collection(
            "Mix",
            vec![item("v1", "One", None), item("v2", "Two", None), deleted],
        );

        let validator = ImportValidator::new(Arc::new(PermissionTable::unlimited()));
        let outcome = validator
            .import_from_source(queue, &source, false, None, &meta_for(1))
            .unwrap();
        assert_eq!(outcome.entries.len(), 2);
    })
    .await;

    let saved = store.load().await.unwrap();
    assert_eq!(saved_titles(&saved), vec!["One", "Two"]);
}

#[tokio::test]
async fn test_persister_saves_after_remove_and_clear() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("queue.json"));

    // Entries without a channel are not saved on addition, only on removal
    run_persister(&store, |queue| {
        queue.append(download_entry("a", None, EntryMeta::default()), false).unwrap();
        queue.append(download_entry("b", None, EntryMeta::default()), false).unwrap();
        queue.remove_at(0).unwrap();
    })
    .await;
    let saved = store.load().await.unwrap();
    assert_eq!(saved_titles(&saved), vec!["b"]);

    run_persister(&store, |queue| {
        queue.append(download_entry("c", None, meta_for(1)), false).unwrap();
        queue.clear();
    })
    .await;
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persister_saves_after_take_next() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("queue.json"));

    let bus = QueueEventBus::new(64);
    let handle = spawn_persister(store.clone(), bus.subscribe());
    let resolver = ScriptedResolver::new().failing("https://media.example/broken");
    let mut queue = Queue::new(Arc::new(resolver), bus.clone(), QueueSettings::default());

    queue.append(download_entry("broken", None, EntryMeta::default()), false).unwrap();
    queue.append(download_entry("good", None, EntryMeta::default()), false).unwrap();
    queue.append(download_entry("later", None, EntryMeta::default()), false).unwrap();

    let next = queue.take_next(false).await.unwrap();
    assert_eq!(next.title(), "good");

    queue.shutdown().await;
    drop(queue);
    drop(bus);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("persister should stop when the bus closes")
        .unwrap();

    let saved = store.load().await.unwrap();
    assert_eq!(saved_titles(&saved), vec!["later"]);
}

#[tokio::test]
async fn test_restored_queue_starts_pending() {
    let temp_dir = TempDir::new().unwrap();
    let store = QueueStore::new(temp_dir.path().join("queue.json"));
    store.save(&sample_entries()).await.unwrap();

    let queue = Queue::from_entries(
        store.load().await.unwrap(),
        Arc::new(ScriptedResolver::new()),
        QueueEventBus::new(16),
        QueueSettings::default(),
    );

    assert_eq!(queue.len(), 3);
    assert!(queue.iter().all(|e| e.readiness() == ReadyState::Pending));
}
