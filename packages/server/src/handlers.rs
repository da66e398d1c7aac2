//! HTTP handler functions for the fireline API.

use std::time::Duration;

use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse, http::header, web};
use async_stream::stream;
use fireline_dispatch::{AssignmentOutcome, DispatchError, DispatchOutcome};
use fireline_geocoder::{LocationSource, ResolvedLocation};
use fireline_incident::TransitionError;
use fireline_incident_models::{Coordinates, NewIncident};
use fireline_realtime::{RouterMessage, SubscriptionFilter};
use fireline_server_models::{
    ApiAssignment, ApiChatMessage, ApiDispatchOutcome, ApiHealth, ApiIncident, ApiLocation,
    ApiStreamEvent, ApiUnread, IncidentQueryParams, LocationParams, PostMessageRequest,
    ReportIncidentRequest, StreamParams,
};

use crate::AppState;
use crate::actor::actor_from_request;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

macro_rules! actor_or_return {
    ($req:expr) => {
        match actor_from_request(&$req) {
            Ok(actor) => actor,
            Err(resp) => return resp,
        }
    };
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/incidents`
pub async fn report_incident(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ReportIncidentRequest>,
) -> HttpResponse {
    let actor = actor_or_return!(req);
    let body = body.into_inner();

    let new = NewIncident {
        incident_type: body.incident_type,
        description: body.description,
        location: Coordinates::new(body.latitude, body.longitude),
        address: body.address,
        station_id: body.station_id,
    };

    match state.coordinator.report(&actor, new).await {
        Ok(incident) => HttpResponse::Created().json(ApiIncident::from(incident)),
        Err(e) => dispatch_error(&e, "Failed to report incident"),
    }
}

/// `GET /api/incidents`
///
/// Filtered poll used by dashboards on mount, on pull-to-refresh, and on
/// resync.
pub async fn list_incidents(
    state: web::Data<AppState>,
    params: web::Query<IncidentQueryParams>,
) -> HttpResponse {
    match state.store.list_incidents(&params.to_query()).await {
        Ok(rows) => {
            let api_incidents: Vec<ApiIncident> = rows.into_iter().map(ApiIncident::from).collect();
            HttpResponse::Ok().json(api_incidents)
        }
        Err(e) => {
            log::error!("Failed to query incidents: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query incidents"
            }))
        }
    }
}

/// `GET /api/incidents/{id}`
///
/// Includes the resolved display location.
pub async fn get_incident(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match state.store.get_incident(&id).await {
        Ok(Some(incident)) => {
            let resolved = state.resolver.resolve(&incident.location_value()).await;
            let mut api = ApiIncident::from(incident);
            api.location_display = Some(resolved.display);
            HttpResponse::Ok().json(api)
        }
        Ok(None) => not_found(&id),
        Err(e) => {
            log::error!("Failed to load incident {id}: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to load incident"
            }))
        }
    }
}

/// Lifecycle actions exposed under `/api/incidents/{id}/...`.
#[derive(Debug, Clone, Copy)]
enum Action {
    Approve,
    Reject,
    Resolve,
    Cancel,
    Withdraw,
    Assign,
}

async fn run_action(
    state: &AppState,
    req: &HttpRequest,
    id: &str,
    action: Action,
) -> HttpResponse {
    let actor = actor_or_return!(req);
    let coordinator = &state.coordinator;

    let result = match action {
        Action::Approve => coordinator.approve(&actor, id).await,
        Action::Reject => coordinator.reject(&actor, id).await,
        Action::Resolve => coordinator.resolve(&actor, id).await,
        Action::Cancel => coordinator.cancel(&actor, id).await,
        Action::Withdraw => coordinator.withdraw(&actor, id).await,
        Action::Assign => coordinator.assign_pending_dispatcher(&actor, id).await,
    };

    match result {
        Ok(outcome) => HttpResponse::Ok().json(api_outcome(outcome)),
        Err(e) => dispatch_error(&e, "Failed to update incident"),
    }
}

/// `POST /api/incidents/{id}/approve`
pub async fn approve(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    run_action(&state, &req, &path, Action::Approve).await
}

/// `POST /api/incidents/{id}/reject`
pub async fn reject(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    run_action(&state, &req, &path, Action::Reject).await
}

/// `POST /api/incidents/{id}/resolve`
pub async fn resolve(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    run_action(&state, &req, &path, Action::Resolve).await
}

/// `POST /api/incidents/{id}/cancel`
pub async fn cancel(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    run_action(&state, &req, &path, Action::Cancel).await
}

/// `POST /api/incidents/{id}/withdraw`
pub async fn withdraw(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    run_action(&state, &req, &path, Action::Withdraw).await
}

/// `POST /api/incidents/{id}/assign`
pub async fn assign(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    run_action(&state, &req, &path, Action::Assign).await
}

/// `POST /api/stations/{id}/reconcile`
///
/// Retries assignment for every approved, unassigned incident of the
/// station. Only that station's firefighters may call it.
pub async fn reconcile_station(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let actor = actor_or_return!(req);
    let station_id = path.into_inner();

    match state
        .coordinator
        .reconcile_unassigned(&actor, &station_id)
        .await
    {
        Ok(outcomes) => {
            let api: Vec<ApiDispatchOutcome> = outcomes.into_iter().map(api_outcome).collect();
            HttpResponse::Ok().json(api)
        }
        Err(e) => dispatch_error(&e, "Failed to reconcile assignments"),
    }
}

/// `GET /api/location?value=...`
pub async fn resolve_location(
    state: web::Data<AppState>,
    params: web::Query<LocationParams>,
) -> HttpResponse {
    let resolved = state.resolver.resolve(&params.value).await;
    HttpResponse::Ok().json(api_location(resolved))
}

/// `POST /api/incidents/{id}/messages`
pub async fn post_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<PostMessageRequest>,
) -> HttpResponse {
    let actor = actor_or_return!(req);
    match state
        .coordinator
        .post_message(&actor, &path, &body.body)
        .await
    {
        Ok(message) => HttpResponse::Created().json(ApiChatMessage::from(message)),
        Err(e) => dispatch_error(&e, "Failed to post message"),
    }
}

/// `GET /api/incidents/{id}/unread`
pub async fn unread(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let actor = actor_or_return!(req);
    let incident_id = path.into_inner();

    match state.store.count_unread(&incident_id, &actor.id).await {
        Ok(count) => HttpResponse::Ok().json(ApiUnread { incident_id, count }),
        Err(e) => {
            log::error!("Failed to count unread messages on {incident_id}: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to count unread messages"
            }))
        }
    }
}

/// `POST /api/incidents/{id}/read`
pub async fn mark_read(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    let actor = actor_or_return!(req);
    let incident_id = path.into_inner();

    match state.store.mark_read(&incident_id, &actor.id).await {
        Ok(()) => HttpResponse::Ok().json(ApiUnread {
            incident_id,
            count: 0,
        }),
        Err(e) => {
            log::error!("Failed to mark {incident_id} read: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to mark messages read"
            }))
        }
    }
}

/// `GET /api/stream`
///
/// Server-Sent Events of the caller's filtered change feed. The
/// subscription is released when the client disconnects.
pub async fn stream_events(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<StreamParams>,
) -> HttpResponse {
    let actor = actor_or_return!(req);

    let filter = match params.into_inner().incident_id {
        Some(id) => SubscriptionFilter::Incident(id),
        None => match SubscriptionFilter::for_actor(&actor) {
            Some(filter) => filter,
            None => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Firefighters must send X-Station-Id"
                }));
            }
        },
    };

    log::info!("Opening event stream for {} {} ({filter:?})", actor.role, actor.id);
    let mut subscription = state.router.subscribe(filter);

    let stream = stream! {
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        loop {
            let next = tokio::select! {
                msg = subscription.recv() => msg.map(|m| sse_chunk(&stream_event(m))),
                _ = keepalive.tick() => Some(Bytes::from_static(b": keep-alive\n\n")),
            };
            let Some(chunk) = next else {
                break;
            };
            yield Ok::<Bytes, actix_web::Error>(chunk);
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .streaming(stream)
}

fn stream_event(message: RouterMessage) -> ApiStreamEvent {
    match message {
        RouterMessage::Change(event) => ApiStreamEvent::Change {
            kind: event.kind,
            incident: ApiIncident::from(event.incident),
        },
        RouterMessage::Message(msg) => ApiStreamEvent::Message {
            message: ApiChatMessage::from(msg),
        },
        RouterMessage::Resync => ApiStreamEvent::Resync,
    }
}

fn sse_chunk(event: &ApiStreamEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(e) => Bytes::from(format!("event: error\ndata: {e}\n\n")),
    }
}

fn api_outcome(outcome: DispatchOutcome) -> ApiDispatchOutcome {
    let assignment = match outcome.assignment {
        AssignmentOutcome::Assigned {
            responder_id,
            distance_km,
        } => ApiAssignment::Assigned {
            responder_id,
            distance_km,
        },
        AssignmentOutcome::NoEligibleResponder => ApiAssignment::NoEligibleResponder,
        AssignmentOutcome::Failed { reason } => ApiAssignment::Failed { reason },
        AssignmentOutcome::NotRequired => ApiAssignment::NotRequired,
    };

    ApiDispatchOutcome {
        incident: ApiIncident::from(outcome.incident),
        assignment,
        message: outcome.message,
    }
}

fn api_location(resolved: ResolvedLocation) -> ApiLocation {
    let (source, provider) = match resolved.source {
        LocationSource::Stored => ("stored", None),
        LocationSource::Geocoded { provider } => ("geocoded", Some(provider)),
        LocationSource::Coordinates => ("coordinates", None),
        LocationSource::Raw => ("raw", None),
    };
    ApiLocation {
        display: resolved.display,
        source: source.to_string(),
        provider,
    }
}

fn not_found(id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("Incident {id} not found")
    }))
}

/// Maps a coordinator error to a response. Store failures are logged and
/// reported generically.
fn dispatch_error(err: &DispatchError, context: &str) -> HttpResponse {
    match err {
        DispatchError::NotFound { id } => not_found(id),
        DispatchError::Transition(TransitionError::Forbidden { .. })
        | DispatchError::Forbidden { .. } => {
            HttpResponse::Forbidden().json(serde_json::json!({ "error": err.to_string() }))
        }
        DispatchError::Transition(TransitionError::IllegalEdge { .. })
        | DispatchError::NotAwaitingAssignment { .. } => {
            HttpResponse::Conflict().json(serde_json::json!({ "error": err.to_string() }))
        }
        DispatchError::InvalidInput { .. } => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": err.to_string() }))
        }
        DispatchError::Store(e) => {
            log::error!("{context}: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": context }))
        }
    }
}
