#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident dispatch: lifecycle writes and dispatcher assignment.
//!
//! [`coordinator::Coordinator`] is the single entry point for mutating an
//! incident. Assignment is pluggable through
//! [`strategy::AssignmentStrategy`], selected by [`config::DispatchConfig`].

pub mod config;
pub mod coordinator;
pub mod strategy;

use fireline_database::StoreError;
use fireline_incident::TransitionError;
use fireline_incident_models::IncidentStatus;
use thiserror::Error;

pub use config::{ConfigError, DispatchConfig, StrategyKind};
pub use coordinator::{AssignmentOutcome, Coordinator, DispatchOutcome};
pub use strategy::{AssignmentError, AssignmentStrategy, DelegatedAssignment, LocalAssignment};

/// Errors returned by [`Coordinator`] operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Backing store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Illegal edge or unauthorized caller.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// No incident with this id.
    #[error("Incident {id} not found")]
    NotFound {
        /// Requested id.
        id: String,
    },

    /// The caller's role may not perform this action.
    #[error("'{actor_id}' may not {action}")]
    Forbidden {
        /// Attempted action.
        action: &'static str,
        /// Caller id.
        actor_id: String,
    },

    /// Manual assignment was requested for an incident that isn't approved.
    #[error("Incident {id} is {status}, not awaiting a dispatcher")]
    NotAwaitingAssignment {
        /// Incident id.
        id: String,
        /// Its current status.
        status: IncidentStatus,
    },

    /// Request data failed validation.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong.
        message: String,
    },
}
