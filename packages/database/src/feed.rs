//! In-process change feed.
//!
//! A thin wrapper over a `tokio` broadcast channel. Slow receivers that fall
//! more than `capacity` events behind see `RecvError::Lagged` and must
//! reconcile by polling.

use fireline_incident_models::{ChangeEvent, ChangeKind, ChatMessage, FeedEvent, Incident};
use tokio::sync::broadcast;

/// Default number of events buffered per receiver.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Publisher side of the change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<FeedEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    /// Creates a feed buffering up to `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a committed incident mutation. `previous` is the row as it
    /// was before the write, if it existed.
    pub fn publish_incident(&self, kind: ChangeKind, incident: &Incident, previous: Option<&Incident>) {
        self.publish(FeedEvent::Incident(ChangeEvent::new(
            kind,
            incident.clone(),
            previous,
        )));
    }

    /// Publishes a committed chat message insert.
    pub fn publish_message(&self, message: &ChatMessage) {
        self.publish(FeedEvent::Message(message.clone()));
    }

    fn publish(&self, event: FeedEvent) {
        // No live receivers is not an error: nobody is listening yet.
        let receivers = self.tx.send(event).unwrap_or(0);
        log::debug!("Published change event to {receivers} receiver(s)");
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }
}
