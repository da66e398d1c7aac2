//! Subscription predicates.

use fireline_incident_models::{
    Actor, ActorRole, ChangeEvent, ChatMessage, Incident, IncidentQuery,
};
use serde::{Deserialize, Serialize};

/// Which incidents a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SubscriptionFilter {
    /// Every incident owned by a station.
    Station(String),
    /// Incidents assigned to a dispatcher.
    Dispatcher(String),
    /// A single incident, including its chat messages.
    Incident(String),
    /// Incidents reported by a civilian.
    Reporter(String),
}

impl SubscriptionFilter {
    /// Default dashboard filter for `actor`.
    ///
    /// Returns `None` for a firefighter with no station affiliation.
    #[must_use]
    pub fn for_actor(actor: &Actor) -> Option<Self> {
        match actor.role {
            ActorRole::Firefighter => actor.station_id.clone().map(Self::Station),
            ActorRole::Dispatcher => Some(Self::Dispatcher(actor.id.clone())),
            ActorRole::Civilian => Some(Self::Reporter(actor.id.clone())),
        }
    }

    /// Whether a change to `incident` should be delivered.
    #[must_use]
    pub fn matches(&self, incident: &Incident) -> bool {
        match self {
            Self::Station(id) => incident.station_id == *id,
            Self::Dispatcher(id) => incident.dispatcher_id.as_ref() == Some(id),
            Self::Incident(id) => incident.id == *id,
            Self::Reporter(id) => incident.reporter_id == *id,
        }
    }

    /// Whether a change event should be delivered. A dispatcher also hears
    /// about the change that released it from an incident.
    #[must_use]
    pub fn matches_change(&self, event: &ChangeEvent) -> bool {
        self.matches(&event.incident)
            || matches!(self, Self::Dispatcher(id) if event.previous_dispatcher_id.as_ref() == Some(id))
    }

    /// Whether a chat message should be delivered. Only single-incident
    /// subscriptions carry chat traffic.
    #[must_use]
    pub fn matches_message(&self, message: &ChatMessage) -> bool {
        matches!(self, Self::Incident(id) if message.incident_id == *id)
    }

    /// The poll equivalent of this filter.
    #[must_use]
    pub fn to_query(&self) -> IncidentQuery {
        let mut query = IncidentQuery::default();
        match self {
            Self::Station(id) => query.station_id = Some(id.clone()),
            Self::Dispatcher(id) => query.dispatcher_id = Some(id.clone()),
            Self::Incident(id) => query.incident_id = Some(id.clone()),
            Self::Reporter(id) => query.reporter_id = Some(id.clone()),
        }
        query
    }
}
