#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident status state machine.
//!
//! Legal edges:
//!
//! ```text
//! pending ──approve──▶ in_progress ──resolve──▶ resolved
//!    │                      │
//!    ├──reject/withdraw──▶ cancelled ◀──cancel──┘
//! ```
//!
//! Callers never supply an expected current status. The edge is validated
//! against whatever status the caller last read, and the resulting write is
//! last-write-wins at the row level.

use chrono::{DateTime, Utc};
use fireline_incident_models::{Actor, ActorRole, Incident, IncidentStatus};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// A named edge of the incident lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    /// Station accepts the report; triggers a dispatcher assignment attempt.
    Approve,
    /// Station turns the report down.
    Reject,
    /// Responder (or station) closes the incident as handled.
    Resolve,
    /// Station calls off an incident already in progress.
    Cancel,
    /// Reporter retracts a report that has not been triaged yet.
    Withdraw,
}

impl Transition {
    /// Status the incident must currently be in.
    #[must_use]
    pub const fn source(self) -> IncidentStatus {
        match self {
            Self::Approve | Self::Reject | Self::Withdraw => IncidentStatus::Pending,
            Self::Resolve | Self::Cancel => IncidentStatus::InProgress,
        }
    }

    /// Status the incident ends up in.
    #[must_use]
    pub const fn target(self) -> IncidentStatus {
        match self {
            Self::Approve => IncidentStatus::InProgress,
            Self::Resolve => IncidentStatus::Resolved,
            Self::Reject | Self::Cancel | Self::Withdraw => IncidentStatus::Cancelled,
        }
    }

}

/// Whether `from -> to` is an edge of the lifecycle graph.
#[must_use]
pub const fn can_transition(from: IncidentStatus, to: IncidentStatus) -> bool {
    from.can_transition_to(to)
}

/// Errors raised when a transition is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The incident is not in the status the edge starts from.
    #[error("cannot {transition} an incident that is {current}")]
    IllegalEdge {
        /// Requested edge.
        transition: Transition,
        /// Status the incident was in.
        current: IncidentStatus,
    },

    /// The caller's role or identity does not permit this edge.
    #[error("{role} '{actor_id}' may not {transition} incident {incident_id}")]
    Forbidden {
        /// Requested edge.
        transition: Transition,
        /// Caller role.
        role: ActorRole,
        /// Caller id.
        actor_id: String,
        /// Target incident.
        incident_id: String,
    },
}

/// Checks that `actor` may trigger `transition` on `incident`.
///
/// * approve, reject, cancel: a firefighter of the owning station
/// * resolve: the assigned dispatcher, or a firefighter of the owning station
/// * withdraw: the civilian who reported the incident
///
/// # Errors
///
/// Returns [`TransitionError::Forbidden`] when the caller is not allowed.
pub fn authorize(
    actor: &Actor,
    incident: &Incident,
    transition: Transition,
) -> Result<(), TransitionError> {
    let station_staff = actor.role == ActorRole::Firefighter
        && actor.station_id.as_deref() == Some(incident.station_id.as_str());

    let allowed = match transition {
        Transition::Approve | Transition::Reject | Transition::Cancel => station_staff,
        Transition::Resolve => {
            station_staff
                || (actor.role == ActorRole::Dispatcher
                    && incident.dispatcher_id.as_deref() == Some(actor.id.as_str()))
        }
        Transition::Withdraw => {
            actor.role == ActorRole::Civilian && actor.id == incident.reporter_id
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(TransitionError::Forbidden {
            transition,
            role: actor.role,
            actor_id: actor.id.clone(),
            incident_id: incident.id.clone(),
        })
    }
}

/// Applies `transition` to a copy of `incident`, stamping it with `now`.
///
/// Terminal targets set `resolved_at`. A cancelled incident never carries a
/// dispatcher. Approval leaves `dispatcher_id` to the assignment step.
///
/// # Errors
///
/// Returns [`TransitionError::IllegalEdge`] when the incident is not in the
/// edge's source status.
pub fn apply(
    incident: &Incident,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<Incident, TransitionError> {
    if incident.status != transition.source() || !can_transition(incident.status, transition.target())
    {
        return Err(TransitionError::IllegalEdge {
            transition,
            current: incident.status,
        });
    }

    let mut next = incident.clone();
    next.status = transition.target();
    next.updated_at = now;

    if next.status.is_terminal() {
        next.resolved_at = Some(now);
    }
    if next.status == IncidentStatus::Cancelled {
        next.dispatcher_id = None;
    }

    log::debug!(
        "Incident {} {} -> {} via {transition}",
        incident.id,
        incident.status,
        next.status
    );

    Ok(next)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use fireline_incident_models::Coordinates;

    use super::*;

    const ALL_TRANSITIONS: &[Transition] = &[
        Transition::Approve,
        Transition::Reject,
        Transition::Resolve,
        Transition::Cancel,
        Transition::Withdraw,
    ];

    fn incident(status: IncidentStatus) -> Incident {
        let created = Utc::now() - Duration::minutes(5);
        Incident {
            id: "inc-1".to_string(),
            incident_type: "fire".to_string(),
            description: "smoke from roof".to_string(),
            location: Coordinates::new(5.60, -0.18),
            address: None,
            reporter_id: "civ-1".to_string(),
            station_id: "st-1".to_string(),
            status,
            dispatcher_id: None,
            created_at: created,
            updated_at: created,
            resolved_at: None,
        }
    }

    #[test]
    fn every_transition_follows_a_graph_edge() {
        for t in ALL_TRANSITIONS {
            assert!(
                can_transition(t.source(), t.target()),
                "{t} is not a legal edge"
            );
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in IncidentStatus::all().iter().filter(|s| s.is_terminal()) {
            for to in IncidentStatus::all() {
                assert!(!can_transition(*from, *to));
            }
        }
    }

    #[test]
    fn no_direct_pending_to_resolved() {
        assert!(!can_transition(
            IncidentStatus::Pending,
            IncidentStatus::Resolved
        ));
        let err = apply(
            &incident(IncidentStatus::Pending),
            Transition::Resolve,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::IllegalEdge {
                transition: Transition::Resolve,
                current: IncidentStatus::Pending,
            }
        );
    }

    #[test]
    fn approve_moves_to_in_progress_without_resolving() {
        let now = Utc::now();
        let next = apply(&incident(IncidentStatus::Pending), Transition::Approve, now).unwrap();
        assert_eq!(next.status, IncidentStatus::InProgress);
        assert_eq!(next.updated_at, now);
        assert!(next.resolved_at.is_none());
        assert!(next.awaiting_dispatcher());
    }

    #[test]
    fn reject_cancels_directly_with_timestamp() {
        let now = Utc::now();
        let next = apply(&incident(IncidentStatus::Pending), Transition::Reject, now).unwrap();
        assert_eq!(next.status, IncidentStatus::Cancelled);
        assert_eq!(next.resolved_at, Some(now));
        assert!(next.dispatcher_id.is_none());
    }

    #[test]
    fn resolve_keeps_dispatcher() {
        let mut inc = incident(IncidentStatus::InProgress);
        inc.dispatcher_id = Some("disp-1".to_string());
        let next = apply(&inc, Transition::Resolve, Utc::now()).unwrap();
        assert_eq!(next.status, IncidentStatus::Resolved);
        assert_eq!(next.dispatcher_id.as_deref(), Some("disp-1"));
        assert!(next.resolved_at.is_some());
    }

    #[test]
    fn cancel_releases_assigned_dispatcher() {
        let mut inc = incident(IncidentStatus::InProgress);
        inc.dispatcher_id = Some("disp-near".to_string());
        let now = Utc::now();

        let next = apply(&inc, Transition::Cancel, now).unwrap();
        assert_eq!(next.status, IncidentStatus::Cancelled);
        assert_eq!(next.resolved_at, Some(now));
        assert!(next.dispatcher_id.is_none());
    }

    #[test]
    fn cancelled_incidents_never_keep_a_dispatcher() {
        for t in ALL_TRANSITIONS
            .iter()
            .filter(|t| t.target() == IncidentStatus::Cancelled)
        {
            let mut inc = incident(t.source());
            inc.dispatcher_id = Some("disp-1".to_string());
            let next = apply(&inc, *t, Utc::now()).unwrap();
            assert!(next.dispatcher_id.is_none(), "{t} kept the dispatcher");
        }
    }

    #[test]
    fn cannot_reapprove_resolved_incident() {
        let err = apply(
            &incident(IncidentStatus::Resolved),
            Transition::Approve,
            Utc::now(),
        );
        assert!(matches!(err, Err(TransitionError::IllegalEdge { .. })));
    }

    #[test]
    fn station_staff_authorization() {
        let inc = incident(IncidentStatus::Pending);
        let own = Actor::firefighter("ff-1", "st-1");
        let other = Actor::firefighter("ff-2", "st-9");

        assert!(authorize(&own, &inc, Transition::Approve).is_ok());
        assert!(authorize(&own, &inc, Transition::Reject).is_ok());
        assert!(authorize(&other, &inc, Transition::Approve).is_err());
        assert!(authorize(&Actor::civilian("civ-1"), &inc, Transition::Approve).is_err());
    }

    #[test]
    fn only_assigned_dispatcher_resolves() {
        let mut inc = incident(IncidentStatus::InProgress);
        inc.dispatcher_id = Some("disp-1".to_string());

        assert!(authorize(&Actor::dispatcher("disp-1"), &inc, Transition::Resolve).is_ok());
        assert!(authorize(&Actor::dispatcher("disp-2"), &inc, Transition::Resolve).is_err());
        assert!(
            authorize(
                &Actor::firefighter("ff-1", "st-1"),
                &inc,
                Transition::Resolve
            )
            .is_ok()
        );
    }

    #[test]
    fn only_reporter_withdraws() {
        let inc = incident(IncidentStatus::Pending);
        assert!(authorize(&Actor::civilian("civ-1"), &inc, Transition::Withdraw).is_ok());
        let err = authorize(&Actor::civilian("civ-2"), &inc, Transition::Withdraw).unwrap_err();
        assert!(err.to_string().contains("civ-2"));
    }

    #[test]
    fn transition_names_parse() {
        assert_eq!("approve".parse::<Transition>().unwrap(), Transition::Approve);
        assert_eq!(Transition::Withdraw.as_ref(), "withdraw");
    }
}
