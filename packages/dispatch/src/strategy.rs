//! Assignment strategies.
//!
//! The coordinator only ever talks to [`AssignmentStrategy`]. Which
//! implementation runs is decided once, from [`DispatchConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fireline_database::{IncidentStore, StoreError};
use fireline_incident_models::{AssignmentResult, Coordinates, Incident, Responder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DispatchConfig, StrategyKind};

/// Errors raised while choosing a responder.
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// The roster could not be loaded.
    #[error("Roster lookup failed: {0}")]
    Store(#[from] StoreError),

    /// HTTP request to the assignment service failed.
    #[error("Assignment service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The assignment service did not answer in time.
    #[error("Assignment service timed out after {millis}ms")]
    Timeout {
        /// Time budget that was exceeded.
        millis: u64,
    },

    /// The assignment service answered with an error payload or status.
    #[error("Assignment service error: {message}")]
    Service {
        /// Message reported by the service.
        message: String,
    },

    /// The response body could not be understood.
    #[error("Malformed assignment response: {message}")]
    Parse {
        /// What was wrong with the body.
        message: String,
    },
}

/// Chooses a responder for an approved incident.
///
/// `Ok(None)` means nobody is eligible. That is not an error.
#[async_trait]
pub trait AssignmentStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Picks a responder for `incident`.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError`] if the roster or the remote service
    /// could not be reached.
    async fn assign(&self, incident: &Incident) -> Result<Option<AssignmentResult>, AssignmentError>;
}

/// Builds the strategy selected by `config`.
#[must_use]
pub fn from_config(
    config: &DispatchConfig,
    store: Arc<dyn IncidentStore>,
    client: reqwest::Client,
) -> Arc<dyn AssignmentStrategy> {
    match config.strategy {
        StrategyKind::Local => Arc::new(LocalAssignment::new(store)),
        StrategyKind::Delegated => Arc::new(DelegatedAssignment::new(
            client,
            config.delegated.url.clone(),
            config.delegated.timeout(),
        )),
    }
}

// ── Local ───────────────────────────────────────────────────────────

/// Runs the nearest-responder matcher over the station's active roster.
pub struct LocalAssignment {
    store: Arc<dyn IncidentStore>,
}

impl LocalAssignment {
    /// Creates a strategy reading rosters from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AssignmentStrategy for LocalAssignment {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn assign(&self, incident: &Incident) -> Result<Option<AssignmentResult>, AssignmentError> {
        let roster = self.store.active_responders(&incident.station_id).await?;
        log::debug!(
            "Matching incident {} against {} active responder(s) of station {}",
            incident.id,
            roster.len(),
            incident.station_id
        );
        Ok(fireline_matcher::nearest_responder(
            incident.location,
            &roster,
        ))
    }
}

// ── Delegated ───────────────────────────────────────────────────────

/// Body POSTed to the assignment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    /// Incident being approved.
    pub incident_id: String,
    /// Incident latitude.
    pub incident_lat: f64,
    /// Incident longitude.
    pub incident_lng: f64,
    /// Owning station.
    pub station_id: String,
}

/// Responder as described by the assignment service.
#[derive(Debug, Clone, Deserialize)]
struct RemoteDispatcher {
    id: String,
    #[serde(default)]
    station_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    distance_km: Option<f64>,
}

/// Calls an external service that owns the assignment decision.
pub struct DelegatedAssignment {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl DelegatedAssignment {
    /// Creates a strategy POSTing to `url` with the given time budget.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl AssignmentStrategy for DelegatedAssignment {
    fn name(&self) -> &'static str {
        "delegated"
    }

    async fn assign(&self, incident: &Incident) -> Result<Option<AssignmentResult>, AssignmentError> {
        let request = AssignmentRequest {
            incident_id: incident.id.clone(),
            incident_lat: incident.location.latitude,
            incident_lng: incident.location.longitude,
            station_id: incident.station_id.clone(),
        };

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssignmentError::Timeout {
                        millis: self.timeout_millis(),
                    }
                } else {
                    AssignmentError::Http(e)
                }
            })?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            let message = body["error"]
                .as_str()
                .map_or_else(|| format!("HTTP {status}"), String::from);
            return Err(AssignmentError::Service { message });
        }

        parse_response(&body, incident)
    }
}

/// Parses `{"assigned_dispatcher": {...}}`, `{"assigned_dispatcher": null}`,
/// or `{"error": "..."}`.
fn parse_response(
    body: &serde_json::Value,
    incident: &Incident,
) -> Result<Option<AssignmentResult>, AssignmentError> {
    if let Some(message) = body["error"].as_str() {
        return Err(AssignmentError::Service {
            message: message.to_string(),
        });
    }

    let Some(obj) = body.as_object() else {
        return Err(AssignmentError::Parse {
            message: "response is not a JSON object".to_string(),
        });
    };
    let Some(value) = obj.get("assigned_dispatcher") else {
        return Err(AssignmentError::Parse {
            message: "response missing 'assigned_dispatcher'".to_string(),
        });
    };
    if value.is_null() {
        return Ok(None);
    }

    let remote: RemoteDispatcher =
        serde_json::from_value(value.clone()).map_err(|e| AssignmentError::Parse {
            message: e.to_string(),
        })?;

    let location = remote
        .latitude
        .zip(remote.longitude)
        .map(|(lat, lng)| Coordinates::new(lat, lng));

    // Distance is recomputed locally when the service leaves it out.
    let distance_km = remote
        .distance_km
        .or_else(|| location.map(|loc| fireline_matcher::haversine_km(incident.location, loc)))
        .unwrap_or(0.0);

    Ok(Some(AssignmentResult {
        responder: Responder {
            id: remote.id,
            station_id: remote
                .station_id
                .unwrap_or_else(|| incident.station_id.clone()),
            name: remote.name.unwrap_or_default(),
            location,
            is_active: true,
        },
        distance_km,
    }))
}
