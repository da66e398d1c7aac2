//! The assignment coordinator.
//!
//! Drives every lifecycle write. Approval runs the configured strategy and
//! persists status and dispatcher together in a single upsert. When no
//! responder can be chosen the incident still moves to `in_progress` and
//! the caller gets the station's contact details instead; such incidents
//! are picked up later by [`Coordinator::assign_pending_dispatcher`] or
//! [`Coordinator::reconcile_unassigned`].

use std::sync::Arc;

use chrono::Utc;
use fireline_database::IncidentStore;
use fireline_incident::{Transition, apply, authorize};
use fireline_incident_models::{
    Actor, ActorRole, ChatMessage, Incident, IncidentQuery, IncidentStatus, NewIncident,
};
use serde::Serialize;

use crate::DispatchError;
use crate::strategy::AssignmentStrategy;

/// What happened during the assignment step of a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// A responder was attached to the incident.
    Assigned {
        /// Chosen responder.
        responder_id: String,
        /// Great-circle distance to the incident.
        distance_km: f64,
    },
    /// The roster had nobody eligible.
    NoEligibleResponder,
    /// The strategy failed; the incident is left unassigned.
    Failed {
        /// Error description.
        reason: String,
    },
    /// The transition has no assignment step.
    NotRequired,
}

impl AssignmentOutcome {
    /// Whether a responder ended up attached.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

/// Result of a coordinator write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    /// The incident as written.
    pub incident: Incident,
    /// Result of the assignment step.
    pub assignment: AssignmentOutcome,
    /// Human-readable summary for the caller. Never empty.
    pub message: String,
}

/// Applies lifecycle transitions and assignment against a store.
pub struct Coordinator {
    store: Arc<dyn IncidentStore>,
    strategy: Arc<dyn AssignmentStrategy>,
}

impl Coordinator {
    /// Creates a coordinator writing to `store` and assigning with
    /// `strategy`.
    #[must_use]
    pub fn new(store: Arc<dyn IncidentStore>, strategy: Arc<dyn AssignmentStrategy>) -> Self {
        Self { store, strategy }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn IncidentStore> {
        &self.store
    }

    /// Records a new civilian report as `pending`.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Forbidden`] if the caller is not a civilian
    /// * [`DispatchError::InvalidInput`] for out-of-range coordinates or an
    ///   empty type/station
    /// * [`DispatchError::Store`] if the insert fails
    pub async fn report(&self, actor: &Actor, new: NewIncident) -> Result<Incident, DispatchError> {
        if actor.role != ActorRole::Civilian {
            return Err(DispatchError::Forbidden {
                action: "report",
                actor_id: actor.id.clone(),
            });
        }
        if !new.location.is_valid() {
            return Err(DispatchError::InvalidInput {
                message: format!(
                    "location ({}, {}) is out of range",
                    new.location.latitude, new.location.longitude
                ),
            });
        }
        if new.incident_type.trim().is_empty() || new.station_id.trim().is_empty() {
            return Err(DispatchError::InvalidInput {
                message: "incident_type and station_id are required".to_string(),
            });
        }

        let now = Utc::now();
        let incident = Incident {
            id: uuid::Uuid::new_v4().to_string(),
            incident_type: new.incident_type,
            description: new.description,
            location: new.location,
            address: new.address.filter(|a| !a.trim().is_empty()),
            reporter_id: actor.id.clone(),
            station_id: new.station_id,
            status: IncidentStatus::Pending,
            dispatcher_id: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        self.store.insert_incident(&incident).await?;
        log::info!(
            "Incident {} ({}) reported to station {}",
            incident.id,
            incident.incident_type,
            incident.station_id
        );
        Ok(incident)
    }

    /// Approves a pending incident and attempts to assign a dispatcher.
    ///
    /// A failed or empty assignment still approves the incident.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the incident doesn't exist, the caller
    /// may not approve it, it is not pending, or the write fails.
    pub async fn approve(
        &self,
        actor: &Actor,
        incident_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let current = self.load(incident_id).await?;
        authorize(actor, &current, Transition::Approve)?;
        let approved = apply(&current, Transition::Approve, Utc::now())?;

        log::info!(
            "Station {} approved incident {incident_id}",
            approved.station_id
        );
        self.assign_and_write(approved).await
    }

    /// Rejects a pending incident straight to `cancelled`.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::approve`].
    pub async fn reject(
        &self,
        actor: &Actor,
        incident_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.transition(actor, incident_id, Transition::Reject, "Incident rejected")
            .await
    }

    /// Marks an in-progress incident as handled.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::approve`].
    pub async fn resolve(
        &self,
        actor: &Actor,
        incident_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.transition(actor, incident_id, Transition::Resolve, "Incident resolved")
            .await
    }

    /// Calls off an in-progress incident.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::approve`].
    pub async fn cancel(
        &self,
        actor: &Actor,
        incident_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.transition(actor, incident_id, Transition::Cancel, "Incident cancelled")
            .await
    }

    /// Lets the reporter retract a pending incident.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::approve`].
    pub async fn withdraw(
        &self,
        actor: &Actor,
        incident_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.transition(actor, incident_id, Transition::Withdraw, "Report withdrawn")
            .await
    }

    /// Retries assignment for an approved incident that has no dispatcher.
    ///
    /// Already-assigned incidents are returned unchanged with
    /// [`AssignmentOutcome::NotRequired`].
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Forbidden`] unless the caller is a firefighter of
    ///   the owning station
    /// * [`DispatchError::NotAwaitingAssignment`] if the incident is not
    ///   `in_progress`
    /// * [`DispatchError::NotFound`] / [`DispatchError::Store`]
    pub async fn assign_pending_dispatcher(
        &self,
        actor: &Actor,
        incident_id: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let current = self.load(incident_id).await?;
        require_station_staff(actor, &current.station_id, "assign")?;
        self.reassign(current).await
    }

    /// Runs reassignment over every unassigned in-progress incident of a
    /// station. Failures on one incident don't stop the others.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::Forbidden`] unless the caller is a firefighter of
    ///   the station
    /// * [`DispatchError::Store`] if the incidents can't be listed
    pub async fn reconcile_unassigned(
        &self,
        actor: &Actor,
        station_id: &str,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        require_station_staff(actor, station_id, "reconcile")?;

        let query = IncidentQuery {
            station_id: Some(station_id.to_string()),
            statuses: vec![IncidentStatus::InProgress],
            ..IncidentQuery::default()
        };
        let unassigned: Vec<Incident> = self
            .store
            .list_incidents(&query)
            .await?
            .into_iter()
            .filter(Incident::awaiting_dispatcher)
            .collect();

        log::info!(
            "Reconciling {} unassigned incident(s) for station {station_id}",
            unassigned.len()
        );

        let mut outcomes = Vec::with_capacity(unassigned.len());
        for incident in unassigned {
            let id = incident.id.clone();
            match self.reassign(incident).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::error!("Reconcile of incident {id} failed: {e}"),
            }
        }
        Ok(outcomes)
    }

    /// Appends a chat message to an incident's conversation.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInput`] for an empty body,
    /// [`DispatchError::NotFound`] for an unknown incident, or
    /// [`DispatchError::Store`] if the insert fails.
    pub async fn post_message(
        &self,
        actor: &Actor,
        incident_id: &str,
        body: &str,
    ) -> Result<ChatMessage, DispatchError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(DispatchError::InvalidInput {
                message: "message body is empty".to_string(),
            });
        }
        self.load(incident_id).await?;

        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            sender_id: actor.id.clone(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_message(&message).await?;
        Ok(message)
    }

    async fn load(&self, incident_id: &str) -> Result<Incident, DispatchError> {
        self.store
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound {
                id: incident_id.to_string(),
            })
    }

    async fn transition(
        &self,
        actor: &Actor,
        incident_id: &str,
        transition: Transition,
        message: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let current = self.load(incident_id).await?;
        authorize(actor, &current, transition)?;
        let next = apply(&current, transition, Utc::now())?;

        self.store.upsert_incident(&next).await?;
        log::info!("Incident {incident_id} is now {} ({transition})", next.status);

        Ok(DispatchOutcome {
            incident: next,
            assignment: AssignmentOutcome::NotRequired,
            message: message.to_string(),
        })
    }

    async fn reassign(&self, current: Incident) -> Result<DispatchOutcome, DispatchError> {
        if current.status != IncidentStatus::InProgress {
            return Err(DispatchError::NotAwaitingAssignment {
                id: current.id,
                status: current.status,
            });
        }
        if let Some(dispatcher) = current.dispatcher_id.clone() {
            return Ok(DispatchOutcome {
                incident: current,
                assignment: AssignmentOutcome::NotRequired,
                message: format!("Dispatcher {dispatcher} is already assigned"),
            });
        }

        let mut next = current;
        next.updated_at = Utc::now();
        self.assign_and_write(next).await
    }

    /// Runs the strategy on an `in_progress` incident and writes the result
    /// as one upsert.
    async fn assign_and_write(&self, mut incident: Incident) -> Result<DispatchOutcome, DispatchError> {
        let assignment = match self.strategy.assign(&incident).await {
            Ok(Some(result)) => {
                log::info!(
                    "Assigned dispatcher {} to incident {} ({:.2} km, {} strategy)",
                    result.responder.id,
                    incident.id,
                    result.distance_km,
                    self.strategy.name()
                );
                incident.dispatcher_id = Some(result.responder.id.clone());
                AssignmentOutcome::Assigned {
                    responder_id: result.responder.id,
                    distance_km: result.distance_km,
                }
            }
            Ok(None) => {
                log::warn!(
                    "No eligible responder for incident {} at station {}",
                    incident.id,
                    incident.station_id
                );
                AssignmentOutcome::NoEligibleResponder
            }
            Err(e) => {
                log::warn!(
                    "Assignment for incident {} failed ({} strategy): {e}",
                    incident.id,
                    self.strategy.name()
                );
                AssignmentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.store.upsert_incident(&incident).await?;

        let message = match &assignment {
            AssignmentOutcome::Assigned {
                responder_id,
                distance_km,
            } => format!("Dispatcher {responder_id} assigned, {distance_km:.1} km away"),
            _ => self.fallback_message(&incident.station_id).await,
        };

        Ok(DispatchOutcome {
            incident,
            assignment,
            message,
        })
    }

    async fn fallback_message(&self, station_id: &str) -> String {
        match self.store.get_station(station_id).await {
            Ok(Some(station)) => {
                let mut message =
                    format!("A responder from {} will be assigned shortly.", station.name);
                if let Some(phone) = station.phone.filter(|p| !p.trim().is_empty()) {
                    message.push_str(" Contact the station at ");
                    message.push_str(&phone);
                    message.push('.');
                }
                message
            }
            Ok(None) => "A responder will be assigned shortly.".to_string(),
            Err(e) => {
                log::warn!("Station lookup for {station_id} failed: {e}");
                "A responder will be assigned shortly.".to_string()
            }
        }
    }
}

/// Only firefighters of `station_id` may drive assignment for it.
fn require_station_staff(
    actor: &Actor,
    station_id: &str,
    action: &'static str,
) -> Result<(), DispatchError> {
    if actor.role == ActorRole::Firefighter && actor.station_id.as_deref() == Some(station_id) {
        Ok(())
    } else {
        Err(DispatchError::Forbidden {
            action,
            actor_id: actor.id.clone(),
        })
    }
}
