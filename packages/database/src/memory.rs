//! In-process [`IncidentStore`] backed by ordered maps.
//!
//! Follows the same semantics as the SQL store (last-write-wins upserts,
//! read marks at the newest message timestamp) so the dispatch core behaves
//! identically on either backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fireline_incident_models::{
    ChangeKind, ChatMessage, FeedEvent, Incident, IncidentQuery, Responder, Station,
};
use tokio::sync::{RwLock, broadcast};

use crate::feed::ChangeFeed;
use crate::{IncidentStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    incidents: BTreeMap<String, Incident>,
    responders: BTreeMap<String, Responder>,
    stations: BTreeMap<String, Station>,
    messages: Vec<ChatMessage>,
    /// (incident, viewer) -> newest message timestamp seen at mark time
    read_marks: BTreeMap<(String, String), DateTime<Utc>>,
}

/// Store that keeps every table in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    feed: ChangeFeed,
}

impl MemoryStore {
    /// Creates an empty store with the default feed capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store publishing on `feed`.
    #[must_use]
    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            tables: RwLock::default(),
            feed,
        }
    }

    /// The feed this store publishes on.
    #[must_use]
    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn insert_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.incidents.contains_key(&incident.id) {
            return Err(StoreError::Duplicate {
                table: "incidents",
                id: incident.id.clone(),
            });
        }
        tables
            .incidents
            .insert(incident.id.clone(), incident.clone());
        self.feed.publish_incident(ChangeKind::Insert, incident, None);
        Ok(())
    }

    async fn upsert_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let previous = tables
            .incidents
            .insert(incident.id.clone(), incident.clone());
        self.feed
            .publish_incident(ChangeKind::Update, incident, previous.as_ref());
        Ok(())
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        Ok(self.tables.read().await.incidents.get(id).cloned())
    }

    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Incident> = tables
            .incidents
            .values()
            .filter(|i| query.matches(i))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn active_responders(&self, station_id: &str) -> Result<Vec<Responder>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .responders
            .values()
            .filter(|r| r.is_active && r.station_id == station_id)
            .cloned()
            .collect())
    }

    async fn save_responder(&self, responder: &Responder) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .responders
            .insert(responder.id.clone(), responder.clone());
        Ok(())
    }

    async fn get_station(&self, station_id: &str) -> Result<Option<Station>, StoreError> {
        Ok(self.tables.read().await.stations.get(station_id).cloned())
    }

    async fn save_station(&self, station: &Station) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .stations
            .insert(station.id.clone(), station.clone());
        Ok(())
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.messages.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Duplicate {
                table: "chat_messages",
                id: message.id.clone(),
            });
        }
        tables.messages.push(message.clone());
        self.feed.publish_message(message);
        Ok(())
    }

    async fn count_unread(&self, incident_id: &str, viewer_id: &str) -> Result<u32, StoreError> {
        let tables = self.tables.read().await;
        let mark = tables
            .read_marks
            .get(&(incident_id.to_string(), viewer_id.to_string()))
            .copied();

        let count = tables
            .messages
            .iter()
            .filter(|m| m.incident_id == incident_id && m.sender_id != viewer_id)
            .filter(|m| mark.is_none_or(|seen| m.created_at > seen))
            .count();

        u32::try_from(count).map_err(|e| StoreError::Conversion {
            message: format!("Unread count overflow: {e}"),
        })
    }

    async fn mark_read(&self, incident_id: &str, viewer_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let newest = tables
            .messages
            .iter()
            .filter(|m| m.incident_id == incident_id)
            .map(|m| m.created_at)
            .max();

        if let Some(newest) = newest {
            tables
                .read_marks
                .insert((incident_id.to_string(), viewer_id.to_string()), newest);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }
}
