//! Media bot queue tool (mbq) - Main entry point
//!
//! Inspects and edits the persisted playback queue of one playback context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mbq_common::config::{resolve_data_folder, TomlConfig, AUDIO_CACHE_DIR, QUEUE_FILE_NAME};
use mbq_common::time::format_duration;
use mbq_queue::{
    CacheResolver, EntryMeta, ImportValidator, MetaRef, PermissionTable, Queue, QueueEvent,
    QueueEventBus, QueueStore, SourceInfo,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mbq
#[derive(Parser, Debug)]
#[command(name = "mbq")]
#[command(about = "Inspect and edit a media bot playback queue")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "MBQ_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the queue file and media cache
    #[arg(short, long)]
    data_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List queued entries
    Show,

    /// Import a resolved source description (extractor JSON)
    Import {
        source: PathBuf,

        /// Add to the front of the queue
        #[arg(long)]
        head: bool,

        #[arg(long, requires = "author_name")]
        author_id: Option<u64>,
        #[arg(long, requires = "author_id")]
        author_name: Option<String>,

        #[arg(long, requires = "channel_name")]
        channel_id: Option<u64>,
        #[arg(long, requires = "channel_id")]
        channel_name: Option<String>,

        /// Platform id of an item that is already queued
        #[arg(long)]
        skip_id: Option<String>,
    },

    /// Remove the entry at an index
    Remove { index: usize },

    /// Move an entry to another index
    Move { from: usize, to: usize },

    /// Shuffle the queue
    Shuffle,

    /// Interleave entries by contributor
    RoundRobin,

    /// Pop the next playable entry
    Next,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration is read before logging starts so its level can apply
    let config = TomlConfig::load_or_default(args.config.as_deref());
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config.context("Failed to load configuration")?;
    let data_folder = resolve_data_folder(args.data_folder.as_deref(), &config);
    info!("Data folder: {}", data_folder.display());

    let store = QueueStore::new(data_folder.join(QUEUE_FILE_NAME));
    let entries = store
        .load()
        .await
        .with_context(|| format!("Failed to load queue from {}", store.path().display()))?;

    let resolver = Arc::new(CacheResolver::new(data_folder.join(AUDIO_CACHE_DIR)));
    let events = QueueEventBus::new(config.queue.event_bus_capacity);
    let mut queue = Queue::from_entries(entries, resolver, events, config.queue.clone());

    let changed = match args.command {
        Command::Show => {
            show(&queue);
            false
        }
        Command::Import {
            source,
            head,
            author_id,
            author_name,
            channel_id,
            channel_name,
            skip_id,
        } => {
            let meta = EntryMeta {
                author: author_id.zip(author_name).map(|(id, name)| MetaRef::new(id, name)),
                channel: channel_id.zip(channel_name).map(|(id, name)| MetaRef::new(id, name)),
                ..Default::default()
            };
            let permissions = Arc::new(PermissionTable::from_settings(&config.permissions));
            import(&mut queue, &source, head, skip_id.as_deref(), &meta, permissions).await?;
            true
        }
        Command::Remove { index } => {
            let entry = queue.remove_at(index)?;
            println!("Removed {}", entry.display_name());
            true
        }
        Command::Move { from, to } => {
            if to >= queue.len() {
                bail!("Target index {} out of bounds for queue of length {}", to, queue.len());
            }
            let entry = queue.remove_at(from)?;
            println!("Moved {} to {}", entry.display_name(), to);
            queue.insert_at(to, entry)?;
            true
        }
        Command::Shuffle => {
            queue.shuffle();
            true
        }
        Command::RoundRobin => {
            queue.reorder_round_robin();
            true
        }
        Command::Next => {
            next(&mut queue).await;
            true
        }
    };

    queue.shutdown().await;

    if changed {
        if config.queue.persistent_queue {
            store
                .save(&queue.snapshot())
                .await
                .with_context(|| format!("Failed to save queue to {}", store.path().display()))?;
        } else {
            warn!("persistent_queue is disabled, changes were not saved");
        }
    }

    Ok(())
}

fn show(queue: &Queue) {
    if queue.is_empty() {
        println!("Queue is empty");
        return;
    }

    for (index, entry) in queue.iter().enumerate() {
        let duration = entry
            .duration()
            .map(format_duration)
            .unwrap_or_else(|| "?:??".to_string());
        let author = entry
            .meta()
            .author
            .as_ref()
            .map(|a| format!(" - added by {}", a.name))
            .unwrap_or_default();
        println!("{:>3}. [{}] {}{}", index, duration, entry.display_name(), author);
    }

    match queue.estimate_time_until(queue.len() + 1, None) {
        Ok(total) => println!("Total: {}", format_duration(total)),
        Err(_) => println!("Total: unknown"),
    }
}

async fn import(
    queue: &mut Queue,
    source: &Path,
    head: bool,
    skip_id: Option<&str>,
    meta: &EntryMeta,
    permissions: Arc<PermissionTable>,
) -> Result<()> {
    let json = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let info: SourceInfo = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a source description", source.display()))?;

    let validator = ImportValidator::new(permissions);
    let outcome = validator.import_from_source(queue, &info, head, skip_id, meta)?;

    println!(
        "Enqueued {} entries at position {} ({} skipped)",
        outcome.entries.len(),
        outcome.position,
        outcome.bad_items
    );
    Ok(())
}

async fn next(queue: &mut Queue) {
    let mut rx = queue.events().subscribe();

    let entry = queue.take_next(true).await;

    while let Ok(event) = rx.try_recv() {
        if let QueueEvent::EntryFailed { entry, error, .. } = event {
            println!("Skipped {}: {}", entry.display_name(), error);
        }
    }

    match entry.and_then(|e| e.media().map(|m| (e, m))) {
        Some((entry, media)) => println!("Next: {} ({})", entry.display_name(), media.location()),
        None => println!("Nothing playable in the queue"),
    }
}
