//! Event distribution for MBQ
//!
//! Provides the EventBus shared by every MBQ component. The bus is generic
//! over the event type so each crate defines its own event enum while keeping
//! one broadcast mechanism.

use tokio::sync::broadcast;

/// Default channel capacity for production use
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Events are delivered to each subscriber in the order they were emitted.
///
/// # Examples
///
/// ```
/// use mbq_common::events::EventBus;
///
/// let bus: EventBus<String> = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit("entry-added".to_string()).ok();
/// assert_eq!(rx.try_recv().unwrap(), "entry-added");
/// ```
#[derive(Debug)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
    capacity: usize,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<E: Clone> EventBus<E> {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   start losing the oldest events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Queue notifications are advisory: a queue with nobody listening
    /// keeps working.
    pub fn emit_lossy(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
