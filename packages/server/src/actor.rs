//! Caller identity from request headers.
//!
//! Sessions are owned by the fronting auth layer, which forwards the
//! caller as `X-Actor-Role`, `X-Actor-Id`, and (for firefighters)
//! `X-Station-Id`.

use actix_web::{HttpRequest, HttpResponse};
use fireline_incident_models::{Actor, ActorRole};

/// Header carrying the caller role.
pub const ROLE_HEADER: &str = "X-Actor-Role";
/// Header carrying the caller id.
pub const ID_HEADER: &str = "X-Actor-Id";
/// Header carrying a firefighter's station.
pub const STATION_HEADER: &str = "X-Station-Id";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reads the caller from `req`, or returns the `401` response to send.
///
/// # Errors
///
/// Returns an unauthorized response if the role or id header is missing
/// or the role is unknown.
pub fn actor_from_request(req: &HttpRequest) -> Result<Actor, HttpResponse> {
    let unauthorized = |reason: &str| {
        HttpResponse::Unauthorized().json(serde_json::json!({ "error": reason }))
    };

    let role: ActorRole = header(req, ROLE_HEADER)
        .ok_or_else(|| unauthorized("Missing X-Actor-Role header"))?
        .parse()
        .map_err(|_| unauthorized("Unknown actor role"))?;
    let id = header(req, ID_HEADER).ok_or_else(|| unauthorized("Missing X-Actor-Id header"))?;

    Ok(Actor {
        role,
        id: id.to_string(),
        station_id: header(req, STATION_HEADER).map(String::from),
    })
}
