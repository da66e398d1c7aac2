#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the fireline dispatch core.
//!
//! Serves the REST API for reporting and triaging incidents, the chat
//! unread endpoints, the location resolver, and a Server-Sent Events
//! stream of each caller's filtered change feed. The caller's role and id
//! are read from headers set by the fronting auth layer.

pub mod actor;
mod handlers;
pub mod interactive;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use fireline_database::IncidentStore;
use fireline_database::db;
use fireline_database::feed::ChangeFeed;
use fireline_dispatch::{Coordinator, DispatchConfig, strategy};
use fireline_geocoder::LocationResolver;
use fireline_realtime::FanoutRouter;

/// Shared application state.
pub struct AppState {
    /// Backing store.
    pub store: Arc<dyn IncidentStore>,
    /// Lifecycle writes and assignment.
    pub coordinator: Coordinator,
    /// Location fallback chain.
    pub resolver: LocationResolver,
    /// Fan-out of the store's change feed.
    pub router: FanoutRouter,
}

impl AppState {
    /// Wires the coordinator and router around `store`. Must be called
    /// from within a Tokio runtime.
    #[must_use]
    pub fn new(
        store: Arc<dyn IncidentStore>,
        strategy: Arc<dyn strategy::AssignmentStrategy>,
        resolver: LocationResolver,
    ) -> Self {
        let router = FanoutRouter::start(Arc::clone(&store));
        Self {
            coordinator: Coordinator::new(Arc::clone(&store), strategy),
            store,
            resolver,
            router,
        }
    }
}

/// Registers every API route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/incidents", web::post().to(handlers::report_incident))
            .route("/incidents", web::get().to(handlers::list_incidents))
            .route("/incidents/{id}", web::get().to(handlers::get_incident))
            .route("/incidents/{id}/approve", web::post().to(handlers::approve))
            .route("/incidents/{id}/reject", web::post().to(handlers::reject))
            .route("/incidents/{id}/resolve", web::post().to(handlers::resolve))
            .route("/incidents/{id}/cancel", web::post().to(handlers::cancel))
            .route("/incidents/{id}/withdraw", web::post().to(handlers::withdraw))
            .route("/incidents/{id}/assign", web::post().to(handlers::assign))
            .route(
                "/incidents/{id}/messages",
                web::post().to(handlers::post_message),
            )
            .route("/incidents/{id}/unread", web::get().to(handlers::unread))
            .route("/incidents/{id}/read", web::post().to(handlers::mark_read))
            .route(
                "/stations/{id}/reconcile",
                web::post().to(handlers::reconcile_station),
            )
            .route("/location", web::get().to(handlers::resolve_location))
            .route("/stream", web::get().to(handlers::stream_events)),
    );
}

/// Starts the fireline API server.
///
/// Opens the store described by the environment (see
/// [`fireline_database::db::connect_from_env`]), loads the dispatch
/// configuration, builds the location chain from the geocoder registry,
/// and starts the Actix-Web HTTP server. This is a regular async function;
/// the caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
///
/// # Panics
///
/// Panics if the store cannot be opened or the dispatch configuration is
/// invalid.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    log::info!("Opening store...");
    let store: Arc<dyn IncidentStore> = Arc::new(
        db::connect_from_env(ChangeFeed::default())
            .await
            .expect("Failed to open store"),
    );

    let config = DispatchConfig::load().expect("Invalid dispatch configuration");
    let client = reqwest::Client::new();
    let strategy = strategy::from_config(&config, Arc::clone(&store), client.clone());

    let resolver = LocationResolver::from_registry(&client);
    log::info!("Location chain has {} geocoder tier(s)", resolver.tier_count());

    let state = web::Data::new(AppState::new(store, strategy, resolver));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use fireline_database::memory::MemoryStore;
    use fireline_dispatch::LocalAssignment;
    use fireline_incident_models::{Coordinates, Responder, Station};
    use serde_json::{Value, json};

    use super::*;
    use crate::actor::{ID_HEADER, ROLE_HEADER, STATION_HEADER};

    async fn state() -> web::Data<AppState> {
        let store = Arc::new(MemoryStore::new());
        store
            .save_station(&Station {
                id: "st-1".to_string(),
                name: "Accra Central".to_string(),
                phone: None,
                location: None,
            })
            .await
            .unwrap();
        store
            .save_responder(&Responder {
                id: "disp-1".to_string(),
                station_id: "st-1".to_string(),
                name: "Ama".to_string(),
                location: Some(Coordinates::new(5.618, -0.18)),
                is_active: true,
            })
            .await
            .unwrap();

        let store: Arc<dyn IncidentStore> = store;
        let strategy = Arc::new(LocalAssignment::new(Arc::clone(&store)));
        web::Data::new(AppState::new(store, strategy, LocationResolver::default()))
    }

    fn civilian() -> [(&'static str, &'static str); 2] {
        [(ROLE_HEADER, "civilian"), (ID_HEADER, "civ-1")]
    }

    fn firefighter() -> [(&'static str, &'static str); 3] {
        [
            (ROLE_HEADER, "firefighter"),
            (ID_HEADER, "ff-1"),
            (STATION_HEADER, "st-1"),
        ]
    }

    fn report_body() -> Value {
        json!({
            "incidentType": "fire",
            "description": "smoke from kiosk",
            "latitude": 5.60,
            "longitude": -0.18,
            "stationId": "st-1"
        })
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;
        let resp: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/health").to_request())
                .await;
        assert_eq!(resp["healthy"], true);
    }

    #[actix_web::test]
    async fn report_then_approve_assigns_dispatcher() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let mut req = test::TestRequest::post()
            .uri("/api/incidents")
            .set_json(report_body());
        for h in civilian() {
            req = req.insert_header(h);
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["status"], "pending");
        let id = created["id"].as_str().unwrap().to_string();

        let mut req = test::TestRequest::post().uri(&format!("/api/incidents/{id}/approve"));
        for h in firefighter() {
            req = req.insert_header(h);
        }
        let outcome: Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(outcome["incident"]["status"], "in_progress");
        assert_eq!(outcome["incident"]["dispatcherId"], "disp-1");
        assert_eq!(outcome["assignment"]["outcome"], "assigned");

        let listed: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/incidents?dispatcherId=disp-1&status=in_progress")
                .to_request(),
        )
        .await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn civilian_cannot_approve() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let mut req = test::TestRequest::post()
            .uri("/api/incidents")
            .set_json(report_body());
        for h in civilian() {
            req = req.insert_header(h);
        }
        let created: Value = test::call_and_read_body_json(&app, req.to_request()).await;
        let id = created["id"].as_str().unwrap();

        let mut req = test::TestRequest::post().uri(&format!("/api/incidents/{id}/approve"));
        for h in civilian() {
            req = req.insert_header(h);
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn missing_headers_are_unauthorized() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/incidents")
            .set_json(report_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn unknown_incident_is_not_found() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/incidents/nope").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn location_without_tiers_falls_back_to_coordinates() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let resp: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/location?value=5.6037,-0.1870")
                .to_request(),
        )
        .await;
        assert_eq!(resp["display"], "5.6037, -0.1870");
        assert_eq!(resp["source"], "coordinates");

        let resp: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/location?value=200,10")
                .to_request(),
        )
        .await;
        assert_eq!(resp["display"], "200,10");
        assert_eq!(resp["source"], "raw");
    }

    #[actix_web::test]
    async fn unread_counts_and_marks_read() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let mut req = test::TestRequest::post()
            .uri("/api/incidents")
            .set_json(report_body());
        for h in civilian() {
            req = req.insert_header(h);
        }
        let created: Value = test::call_and_read_body_json(&app, req.to_request()).await;
        let id = created["id"].as_str().unwrap().to_string();

        let mut req = test::TestRequest::post()
            .uri(&format!("/api/incidents/{id}/messages"))
            .set_json(json!({ "body": "is anyone coming?" }));
        for h in civilian() {
            req = req.insert_header(h);
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let mut req = test::TestRequest::get().uri(&format!("/api/incidents/{id}/unread"));
        for h in firefighter() {
            req = req.insert_header(h);
        }
        let unread: Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(unread["count"], 1);

        for _ in 0..2 {
            let mut req = test::TestRequest::post().uri(&format!("/api/incidents/{id}/read"));
            for h in firefighter() {
                req = req.insert_header(h);
            }
            let marked: Value = test::call_and_read_body_json(&app, req.to_request()).await;
            assert_eq!(marked["count"], 0);
        }

        let mut req = test::TestRequest::get().uri(&format!("/api/incidents/{id}/unread"));
        for h in firefighter() {
            req = req.insert_header(h);
        }
        let unread: Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(unread["count"], 0);
    }

    #[actix_web::test]
    async fn reconcile_requires_station_staff() {
        let app = test::init_service(App::new().app_data(state().await).configure(configure)).await;

        let mut req = test::TestRequest::post().uri("/api/stations/st-1/reconcile");
        for h in civilian() {
            req = req.insert_header(h);
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let mut req = test::TestRequest::post()
            .uri("/api/stations/st-1/reconcile")
            .insert_header((STATION_HEADER, "st-1"));
        for h in civilian() {
            req = req.insert_header(h);
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let mut req = test::TestRequest::post().uri("/api/stations/st-1/reconcile");
        for h in firefighter() {
            req = req.insert_header(h);
        }
        let outcomes: Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert!(outcomes.as_array().unwrap().is_empty());
    }
}
