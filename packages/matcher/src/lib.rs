#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Nearest-responder matcher.
//!
//! Picks the closest on-duty responder to an incident by haversine
//! great-circle distance on a sphere of radius 6371 km. Responders without
//! a known position are never candidates. An empty candidate set is a
//! normal outcome (`None`), not an error, so callers can still advance the
//! incident and fall back to station-level contact details.
//!
//! Equal distances are broken by the lowest responder id so that the result
//! does not depend on roster order.

use std::cmp::Ordering;

use fireline_incident_models::{AssignmentResult, Coordinates, Responder};
use geo::{Distance, HaversineMeasure, Point};

/// Mean Earth radius used for all distance computations, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinate pairs, in kilometres.
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let a = Point::new(a.longitude, a.latitude);
    let b = Point::new(b.longitude, b.latitude);
    HaversineMeasure::new(EARTH_RADIUS_M).distance(a, b) / 1000.0
}

/// Every eligible responder with its distance to `incident`, closest first.
///
/// Inactive responders and responders with no (or invalid) position are
/// dropped.
#[must_use]
pub fn rank_responders(incident: Coordinates, roster: &[Responder]) -> Vec<AssignmentResult> {
    let mut ranked: Vec<AssignmentResult> = roster
        .iter()
        .filter(|r| r.is_active)
        .filter_map(|r| {
            let location = r.location.filter(Coordinates::is_valid)?;
            Some(AssignmentResult {
                responder: r.clone(),
                distance_km: haversine_km(incident, location),
            })
        })
        .collect();

    ranked.sort_by(compare);
    ranked
}

/// The closest eligible responder, or `None` when nobody qualifies.
#[must_use]
pub fn nearest_responder(incident: Coordinates, roster: &[Responder]) -> Option<AssignmentResult> {
    let best = roster
        .iter()
        .filter(|r| r.is_active)
        .filter_map(|r| {
            let location = r.location.filter(Coordinates::is_valid)?;
            Some((r, haversine_km(incident, location)))
        })
        .min_by(|(a, da), (b, db)| {
            da.partial_cmp(db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(r, distance_km)| AssignmentResult {
            responder: r.clone(),
            distance_km,
        });

    match &best {
        Some(result) => log::debug!(
            "Nearest responder {} at {:.3} km",
            result.responder.id,
            result.distance_km
        ),
        None => log::debug!("No eligible responder among {} candidates", roster.len()),
    }

    best
}

fn compare(a: &AssignmentResult, b: &AssignmentResult) -> Ordering {
    a.distance_km
        .partial_cmp(&b.distance_km)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.responder.id.cmp(&b.responder.id))
}
