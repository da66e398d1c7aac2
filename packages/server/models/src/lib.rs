#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the fireline server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the core model types to allow independent evolution of the API
//! contract.

use chrono::{DateTime, Utc};
use fireline_incident_models::{
    ChangeKind, ChatMessage, Incident, IncidentQuery, IncidentStatus,
};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// An incident as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiIncident {
    /// Unique incident ID.
    pub id: String,
    /// Incident type.
    pub incident_type: String,
    /// Reporter's description.
    pub description: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Previously resolved address.
    pub address: Option<String>,
    /// Human-readable location, when the caller asked for it to be resolved.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location_display: Option<String>,
    /// Reporting civilian.
    pub reporter_id: String,
    /// Owning station.
    pub station_id: String,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Assigned dispatcher.
    pub dispatcher_id: Option<String>,
    /// When the incident was reported.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
    /// When the incident reached a terminal status.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<Incident> for ApiIncident {
    fn from(row: Incident) -> Self {
        Self {
            id: row.id,
            incident_type: row.incident_type,
            description: row.description,
            latitude: row.location.latitude,
            longitude: row.location.longitude,
            address: row.address,
            location_display: None,
            reporter_id: row.reporter_id,
            station_id: row.station_id,
            status: row.status,
            dispatcher_id: row.dispatcher_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        }
    }
}

/// Query parameters for the incidents endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentQueryParams {
    /// Owning station.
    pub station_id: Option<String>,
    /// Assigned dispatcher.
    pub dispatcher_id: Option<String>,
    /// Reporting civilian.
    pub reporter_id: Option<String>,
    /// Comma-separated statuses (e.g. `pending,in_progress`).
    pub status: Option<String>,
}

impl IncidentQueryParams {
    /// Converts to a store query. Unknown status names are ignored.
    #[must_use]
    pub fn to_query(&self) -> IncidentQuery {
        let statuses: Vec<IncidentStatus> = self
            .status
            .as_deref()
            .map(|s| s.split(',').filter_map(|c| c.trim().parse().ok()).collect())
            .unwrap_or_default();

        IncidentQuery {
            station_id: self.station_id.clone(),
            dispatcher_id: self.dispatcher_id.clone(),
            reporter_id: self.reporter_id.clone(),
            incident_id: None,
            statuses,
        }
    }
}

/// Body of `POST /api/incidents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIncidentRequest {
    /// Incident type.
    pub incident_type: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Optional pre-resolved address.
    pub address: Option<String>,
    /// Station the report is routed to.
    pub station_id: String,
}

/// Assignment step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApiAssignment {
    /// A dispatcher was attached.
    #[serde(rename_all = "camelCase")]
    Assigned {
        /// Chosen dispatcher.
        responder_id: String,
        /// Distance to the incident in kilometres.
        distance_km: f64,
    },
    /// Nobody on the roster was eligible.
    NoEligibleResponder,
    /// The assignment strategy failed.
    Failed {
        /// Error description.
        reason: String,
    },
    /// The transition has no assignment step.
    NotRequired,
}

/// Response of every lifecycle action endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDispatchOutcome {
    /// The incident as written.
    pub incident: ApiIncident,
    /// Assignment step result.
    pub assignment: ApiAssignment,
    /// Message to show the caller.
    pub message: String,
}

/// Query parameters for the location endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationParams {
    /// Stored location value (an address or `"lat,lng"`).
    pub value: String,
}

/// A resolved display location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLocation {
    /// Display string.
    pub display: String,
    /// Which step produced it (`stored`, `geocoded`, `coordinates`, `raw`).
    pub source: String,
    /// Provider id when geocoded.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<String>,
}

/// Body of `POST /api/incidents/{id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    /// Message text.
    pub body: String,
}

/// A chat message as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChatMessage {
    /// Message ID.
    pub id: String,
    /// Incident the message belongs to.
    pub incident_id: String,
    /// Author.
    pub sender_id: String,
    /// Text.
    pub body: String,
    /// When it was stored.
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ApiChatMessage {
    fn from(msg: ChatMessage) -> Self {
        Self {
            id: msg.id,
            incident_id: msg.incident_id,
            sender_id: msg.sender_id,
            body: msg.body,
            created_at: msg.created_at,
        }
    }
}

/// Unread chat count for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUnread {
    /// Incident.
    pub incident_id: String,
    /// Messages from others since the caller's last read.
    pub count: u32,
}

/// Query parameters for the event stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    /// Follow a single incident (and its chat) instead of the role default.
    pub incident_id: Option<String>,
}

/// One Server-Sent Event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiStreamEvent {
    /// An incident changed.
    Change {
        /// Insert, update, or delete.
        kind: ChangeKind,
        /// The incident after the change.
        incident: ApiIncident,
    },
    /// A chat message was posted.
    Message {
        /// The message.
        message: ApiChatMessage,
    },
    /// Events may have been missed; poll `GET /api/incidents`.
    Resync,
}
