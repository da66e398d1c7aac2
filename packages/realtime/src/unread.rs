//! Per-incident unread chat counter.
//!
//! Counts messages from other participants that arrive while the chat view
//! is closed. Opening the chat zeroes the count immediately and then
//! records the read mark in the store.

use std::sync::Arc;

use async_trait::async_trait;
use fireline_database::IncidentStore;
use fireline_incident_models::ChatMessage;
use thiserror::Error;

use crate::RealtimeError;
use crate::router::RouterMessage;

/// A notification cue could not be played.
#[derive(Debug, Error)]
#[error("Notification cue failed: {message}")]
pub struct CueError {
    /// What went wrong.
    pub message: String,
}

/// Audible/visual alert for a new message. Failures never affect the
/// count.
#[async_trait]
pub trait NotificationCue: Send + Sync {
    /// Plays the cue for `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CueError`] if the cue could not be played.
    async fn play(&self, message: &ChatMessage) -> Result<(), CueError>;
}

/// Unread state of one viewer on one incident.
pub struct UnreadCounter {
    store: Arc<dyn IncidentStore>,
    incident_id: String,
    viewer_id: String,
    count: u32,
    chat_open: bool,
    cue: Option<Arc<dyn NotificationCue>>,
}

impl UnreadCounter {
    /// A closed chat with `count = 0`.
    #[must_use]
    pub fn new(
        store: Arc<dyn IncidentStore>,
        incident_id: impl Into<String>,
        viewer_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            incident_id: incident_id.into(),
            viewer_id: viewer_id.into(),
            count: 0,
            chat_open: false,
            cue: None,
        }
    }

    /// Plays `cue` for every counted message.
    #[must_use]
    pub fn with_cue(mut self, cue: Arc<dyn NotificationCue>) -> Self {
        self.cue = Some(cue);
        self
    }

    /// Loads the persisted unread count.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the count query fails.
    pub async fn seed(&mut self) -> Result<u32, RealtimeError> {
        self.count = self
            .store
            .count_unread(&self.incident_id, &self.viewer_id)
            .await?;
        Ok(self.count)
    }

    /// Handles a router message. Returns whether the count went up.
    pub async fn on_router_message(&mut self, message: &RouterMessage) -> bool {
        match message {
            RouterMessage::Message(msg) => self.on_message(msg).await,
            RouterMessage::Change(_) | RouterMessage::Resync => false,
        }
    }

    /// Handles a newly inserted message. Returns whether the count went up.
    pub async fn on_message(&mut self, message: &ChatMessage) -> bool {
        if message.incident_id != self.incident_id
            || message.sender_id == self.viewer_id
            || self.chat_open
        {
            return false;
        }

        self.count = self.count.saturating_add(1);

        if let Some(cue) = &self.cue
            && let Err(e) = cue.play(message).await
        {
            log::warn!("Unread cue for incident {}: {e}", self.incident_id);
        }
        true
    }

    /// Opens the chat view and marks everything read.
    ///
    /// The local count is zeroed before the store call, so a failing
    /// mark-read only leaves the persisted mark behind.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the read mark could not be
    /// written.
    pub async fn open_chat(&mut self) -> Result<(), RealtimeError> {
        self.chat_open = true;
        self.count = 0;
        self.store
            .mark_read(&self.incident_id, &self.viewer_id)
            .await?;
        Ok(())
    }

    /// Closes the chat view; new messages count again.
    pub const fn close_chat(&mut self) {
        self.chat_open = false;
    }

    /// Current unread count.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Whether the chat view is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.chat_open
    }
}
