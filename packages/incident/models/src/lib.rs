#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Core data model for the fireline dispatch lifecycle.
//!
//! Incidents are reported by civilians, triaged by firefighter stations,
//! and handled by dispatchers. These types are shared by the state
//! machine, the matcher, the store, the realtime router, and the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside
    /// `[-90, 90] x [-180, 180]`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Lifecycle status of an incident.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
    /// Reported, waiting for station triage.
    Pending,
    /// Approved by the station; a dispatcher may or may not be assigned yet.
    InProgress,
    /// Handled by the responder. Terminal.
    Resolved,
    /// Rejected, withdrawn, or called off. Terminal.
    Cancelled,
}

impl IncidentStatus {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Pending,
            Self::InProgress,
            Self::Resolved,
            Self::Cancelled,
        ]
    }

    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Cancelled)
                | (Self::InProgress, Self::Resolved | Self::Cancelled)
        )
    }
}

/// Role of the caller, as supplied by the session collaborator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActorRole {
    /// A member of the public reporting an emergency.
    Civilian,
    /// Station staff triaging incidents.
    Firefighter,
    /// A responder assigned to handle incidents.
    Dispatcher,
}

/// The authenticated caller performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Caller role.
    pub role: ActorRole,
    /// Caller identifier (user id for civilians, staff id otherwise).
    pub id: String,
    /// Station affiliation for firefighters.
    pub station_id: Option<String>,
}

impl Actor {
    /// A civilian caller.
    #[must_use]
    pub fn civilian(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Civilian,
            id: id.into(),
            station_id: None,
        }
    }

    /// A firefighter attached to `station_id`.
    #[must_use]
    pub fn firefighter(id: impl Into<String>, station_id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Firefighter,
            id: id.into(),
            station_id: Some(station_id.into()),
        }
    }

    /// A dispatcher.
    #[must_use]
    pub fn dispatcher(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Dispatcher,
            id: id.into(),
            station_id: None,
        }
    }
}

/// A reported emergency tracked through its status lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier.
    pub id: String,
    /// Incident type (e.g. `"fire"`, `"flood"`).
    pub incident_type: String,
    /// Free-text description from the reporter.
    pub description: String,
    /// Where the incident was reported.
    pub location: Coordinates,
    /// Previously resolved human-readable address, if any.
    pub address: Option<String>,
    /// Civilian who reported the incident.
    pub reporter_id: String,
    /// Owning station, set at creation.
    pub station_id: String,
    /// Current lifecycle status.
    pub status: IncidentStatus,
    /// Assigned dispatcher. Only set on the approval path.
    pub dispatcher_id: Option<String>,
    /// When the incident was reported.
    pub created_at: DateTime<Utc>,
    /// Last mutation time. Used as the merge version by local views.
    pub updated_at: DateTime<Utc>,
    /// When the incident reached a terminal status.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Whether this incident has been approved but no dispatcher is
    /// attached yet.
    #[must_use]
    pub const fn awaiting_dispatcher(&self) -> bool {
        matches!(self.status, IncidentStatus::InProgress) && self.dispatcher_id.is_none()
    }

    /// The stored location as a `"lat,lng"` string, or the resolved address
    /// when one exists. This is the value fed to the location resolver.
    #[must_use]
    pub fn location_value(&self) -> String {
        self.address.clone().unwrap_or_else(|| {
            format!("{},{}", self.location.latitude, self.location.longitude)
        })
    }
}

/// Input for reporting a new incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    /// Incident type.
    pub incident_type: String,
    /// Free-text description.
    pub description: String,
    /// Where the incident is.
    pub location: Coordinates,
    /// Optional pre-resolved address.
    pub address: Option<String>,
    /// Station the report is routed to.
    pub station_id: String,
}

/// A staff member eligible for assignment to incidents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    /// Unique identifier.
    pub id: String,
    /// Station affiliation.
    pub station_id: String,
    /// Display name.
    pub name: String,
    /// Last known position, if the responder has reported one.
    pub location: Option<Coordinates>,
    /// Whether the responder is on duty.
    pub is_active: bool,
}

/// A firefighter station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Public contact number.
    pub phone: Option<String>,
    /// Station position.
    pub location: Option<Coordinates>,
}

/// The responder chosen by the matcher and the distance to the incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResult {
    /// Chosen responder.
    pub responder: Responder,
    /// Great-circle distance to the incident in kilometres.
    pub distance_km: f64,
}

/// A chat message attached to an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier.
    pub id: String,
    /// Incident the conversation belongs to.
    pub incident_id: String,
    /// Author.
    pub sender_id: String,
    /// Message text.
    pub body: String,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

/// Operation kind carried by a change notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    /// A row was created.
    Insert,
    /// A row was modified.
    Update,
    /// A row was removed.
    Delete,
}

/// A committed incident mutation with the full post-change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened to the row.
    pub kind: ChangeKind,
    /// The incident after the change.
    pub incident: Incident,
    /// Dispatcher the row was assigned to before the change, when the
    /// change released or replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_dispatcher_id: Option<String>,
}

impl ChangeEvent {
    /// Builds an event for `incident`, remembering the dispatcher of
    /// `previous` if the change dropped it.
    #[must_use]
    pub fn new(kind: ChangeKind, incident: Incident, previous: Option<&Incident>) -> Self {
        let previous_dispatcher_id = previous
            .and_then(|row| row.dispatcher_id.clone())
            .filter(|id| incident.dispatcher_id.as_ref() != Some(id));
        Self {
            kind,
            incident,
            previous_dispatcher_id,
        }
    }
}

/// Everything published on the store's change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A row of the `incidents` collection changed.
    Incident(ChangeEvent),
    /// A row was inserted into `chat_messages`.
    Message(ChatMessage),
}

/// Equality/range filters for polling incidents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentQuery {
    /// Only incidents owned by this station.
    pub station_id: Option<String>,
    /// Only incidents assigned to this dispatcher.
    pub dispatcher_id: Option<String>,
    /// Only incidents reported by this civilian.
    pub reporter_id: Option<String>,
    /// Only a single incident.
    pub incident_id: Option<String>,
    /// Only incidents with one of these statuses (empty = any).
    pub statuses: Vec<IncidentStatus>,
}

impl IncidentQuery {
    /// Whether `incident` satisfies every filter set on this query.
    #[must_use]
    pub fn matches(&self, incident: &Incident) -> bool {
        self.station_id
            .as_ref()
            .is_none_or(|s| *s == incident.station_id)
            && self
                .dispatcher_id
                .as_ref()
                .is_none_or(|d| incident.dispatcher_id.as_ref() == Some(d))
            && self
                .reporter_id
                .as_ref()
                .is_none_or(|r| *r == incident.reporter_id)
            && self.incident_id.as_ref().is_none_or(|i| *i == incident.id)
            && (self.statuses.is_empty() || self.statuses.contains(&incident.status))
    }
}
