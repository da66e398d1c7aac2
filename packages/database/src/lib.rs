#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Backing store for the dispatch core.
//!
//! The store is a row store with equality filters plus a change-data-capture
//! style feed: every committed mutation is published once on a
//! [`feed::ChangeFeed`] as a [`FeedEvent`] carrying the full post-change row.
//! All writes are last-write-wins at the row level; nothing here locks rows
//! across calls.
//!
//! Two implementations of [`IncidentStore`]:
//! - [`sql::SqlStore`]: `switchy_database` (`SQLite` or `PostgreSQL`) with
//!   raw SQL via `query_raw_params()` / `exec_raw_params()`.
//! - [`memory::MemoryStore`]: in-process maps, used for local runs and tests.

pub mod db;
pub mod feed;
pub mod memory;
pub mod sql;

use async_trait::async_trait;
use fireline_incident_models::{
    ChatMessage, FeedEvent, Incident, IncidentQuery, Responder, Station,
};
use tokio::sync::broadcast;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Could not open a database connection.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of what went wrong.
        message: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// Insert of a row whose key already exists.
    #[error("{table} row '{id}' already exists")]
    Duplicate {
        /// Table that was written.
        table: &'static str,
        /// Conflicting key.
        id: String,
    },
}

/// The query, write, procedure, and subscription surface the dispatch core
/// depends on.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Inserts a new incident and publishes an `insert` event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails or the id already exists.
    async fn insert_incident(&self, incident: &Incident) -> Result<(), StoreError>;

    /// Writes the full incident row keyed by id (last write wins) and
    /// publishes an `update` event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn upsert_incident(&self, incident: &Incident) -> Result<(), StoreError>;

    /// Loads one incident.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError>;

    /// Lists incidents matching every filter in `query`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>, StoreError>;

    /// Active responders of a station, in roster order (by id).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn active_responders(&self, station_id: &str) -> Result<Vec<Responder>, StoreError>;

    /// Inserts or replaces a roster entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn save_responder(&self, responder: &Responder) -> Result<(), StoreError>;

    /// Loads a station.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn get_station(&self, station_id: &str) -> Result<Option<Station>, StoreError>;

    /// Inserts or replaces a station.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn save_station(&self, station: &Station) -> Result<(), StoreError>;

    /// Stores a chat message and publishes it on the feed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// Remote procedure: messages on `incident_id` not sent by `viewer_id`
    /// and newer than the viewer's last read mark.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn count_unread(&self, incident_id: &str, viewer_id: &str) -> Result<u32, StoreError>;

    /// Remote procedure: marks every message on `incident_id` as read for
    /// `viewer_id`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn mark_read(&self, incident_id: &str, viewer_id: &str) -> Result<(), StoreError>;

    /// Subscribes to the change feed. Only events committed after this call
    /// are delivered.
    fn subscribe(&self) -> broadcast::Receiver<FeedEvent>;
}
