use crate::core::{ConnectionAction, ServiceMatcher};
use crate::models::{
    CategoriesResponse, CategoryListing, ConnectionActionRequest, ConnectionActionResponse,
    Coordinates, DiscoveryResponse, ErrorResponse, HealthResponse, Locality, NormalizeResponse,
    OpenConnectionResponse, RefreshRequest, SearchResponse, ServiceQuery, Viewer,
};
use crate::services::{Backend, SessionStore};
use crate::session::{perform_action, CommitOutcome, DiscoverySession, SessionError};
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub sessions: Arc<SessionStore>,
    pub matcher: ServiceMatcher,
}

/// Configure all discovery routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/services/search", web::get().to(search_services))
        .route("/services/normalize", web::get().to(normalize_service))
        .route("/services/categories", web::get().to(list_categories))
        .route("/discovery/refresh", web::post().to(refresh_discovery))
        .route("/discovery/{viewer_id}", web::get().to(current_entries))
        .route("/connections/request", web::post().to(send_request))
        .route("/connections/cancel", web::post().to(cancel_request))
        .route("/connections/remove", web::post().to(remove_connection))
        .route("/connections/{viewer_id}/{professional_id}", web::get().to(open_connection));
}

fn error_response(status: StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        catalog_size: state.matcher.catalog().len(),
        active_sessions: state.sessions.stats().entries,
        timestamp: chrono::Utc::now(),
    })
}

/// GET /api/v1/services/search?q=wiring
async fn search_services(state: web::Data<AppState>, query: web::Query<ServiceQuery>) -> impl Responder {
    let results = state.matcher.search(&query.q);
    HttpResponse::Ok().json(SearchResponse {
        query: query.q.trim().to_lowercase(),
        results,
    })
}

/// GET /api/v1/services/normalize?q=wiring
async fn normalize_service(state: web::Data<AppState>, query: web::Query<ServiceQuery>) -> impl Responder {
    let resolved = state.matcher.resolve(&query.q);
    HttpResponse::Ok().json(NormalizeResponse {
        input: query.q.clone(),
        name: resolved.name,
        category: resolved.category,
        is_custom: resolved.is_custom,
    })
}

async fn list_categories(state: web::Data<AppState>) -> impl Responder {
    let catalog = state.matcher.catalog();
    let categories = catalog
        .all_categories()
        .into_iter()
        .map(|category| CategoryListing {
            name: category.to_string(),
            services: catalog.entries_in(category).map(|e| e.name.clone()).collect(),
        })
        .collect();

    HttpResponse::Ok().json(CategoriesResponse { categories })
}

/// Refresh a viewer's discovery list
///
/// POST /api/v1/discovery/refresh
///
/// Request body:
/// ```json
/// {
///   "viewerId": "string",
///   "city": "Lagos",
///   "region": "Lagos State",
///   "origin": { "lat": 6.5244, "lng": 3.3792 },
///   "service": "wiring",
///   "trigger": "userRequested"
/// }
/// ```
///
/// A failed fetch still answers 200 with the last good entries marked
/// `stale`.
async fn refresh_discovery(state: web::Data<AppState>, req: web::Json<RefreshRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for refresh request: {:?}", errors);
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string());
    }

    let req = req.into_inner();
    let session = state.sessions.session(&req.viewer_id).await;

    let ticket = {
        let mut s = session.lock().await;
        let mut issued = s.set_viewer(Viewer::new(
            req.viewer_id.clone(),
            Locality {
                city: req.city.clone(),
                region: req.region.clone(),
            },
        ));
        let reported = req.origin.map(|o| Coordinates::new(o.lat, o.lng));
        let fix = s.report_location(reported, chrono::Utc::now());
        issued = s.set_origin(fix).or(issued);
        if let Some(service) = &req.service {
            issued = s.select_service(service).1.or(issued);
        }
        // A state change already started a refresh; otherwise start one
        match issued {
            Some(ticket) => Some(ticket),
            None => s.begin_refresh(req.trigger),
        }
    };

    let Some(ticket) = ticket else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Refresh unavailable",
            "Session has no viewer".to_string(),
        );
    };

    tracing::info!("Refreshing discovery for viewer {} ({:?})", req.viewer_id, req.trigger);

    // Fetch without holding the session so overlapping refreshes coalesce
    let result = DiscoverySession::fetch_snapshot(state.backend.as_ref(), &ticket).await;

    let mut s = session.lock().await;
    let (stale, warning) = match s.commit_refresh(ticket, result) {
        Ok(CommitOutcome::Applied) => (false, None),
        Ok(CommitOutcome::Discarded(reason)) => {
            tracing::debug!("Refresh for {} discarded: {:?}", req.viewer_id, reason);
            (false, None)
        }
        Err(e) => (true, Some(e.to_string())),
    };

    let entries = s.entries();
    tracing::info!("Returning {} entries for viewer {}", entries.len(), req.viewer_id);

    HttpResponse::Ok().json(DiscoveryResponse {
        entries,
        refreshed_at: s.refreshed_at(),
        stale,
        warning,
    })
}

/// Current entries without fetching
async fn current_entries(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let viewer_id = path.into_inner();
    let Some(session) = state.sessions.existing(&viewer_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            "Unknown session",
            format!("No discovery session for {}; refresh first", viewer_id),
        );
    };

    let s = session.lock().await;
    HttpResponse::Ok().json(DiscoveryResponse {
        entries: s.entries(),
        refreshed_at: s.refreshed_at(),
        stale: s.last_error().is_some(),
        warning: s.last_error().map(str::to_string),
    })
}

async fn send_request(state: web::Data<AppState>, req: web::Json<ConnectionActionRequest>) -> impl Responder {
    connection_action(state, req.into_inner(), ConnectionAction::SendRequest).await
}

async fn cancel_request(state: web::Data<AppState>, req: web::Json<ConnectionActionRequest>) -> impl Responder {
    connection_action(state, req.into_inner(), ConnectionAction::CancelRequest).await
}

async fn remove_connection(state: web::Data<AppState>, req: web::Json<ConnectionActionRequest>) -> impl Responder {
    connection_action(state, req.into_inner(), ConnectionAction::RemoveConnection).await
}

/// Optimistic connection action
///
/// The session is released while the backend call runs so refreshes can
/// proceed; the result is then settled against whatever state is current.
async fn connection_action(
    state: web::Data<AppState>,
    req: ConnectionActionRequest,
    action: ConnectionAction,
) -> HttpResponse {
    if let Err(errors) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string());
    }

    let Some(session) = state.sessions.existing(&req.viewer_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            "Unknown session",
            format!("No discovery session for {}; refresh first", req.viewer_id),
        );
    };

    let begun = session.lock().await.begin_action(&req.professional_id, action);
    let (viewer_id, transition) = match begun {
        Ok(begun) => begun,
        Err(e @ SessionError::Transition(_)) => {
            return error_response(StatusCode::CONFLICT, "Action not available", e.to_string());
        }
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "Action rejected", e.to_string());
        }
    };

    tracing::info!("{:?} {} -> {}", action, viewer_id, req.professional_id);

    let result = perform_action(state.backend.as_ref(), &viewer_id, &transition).await;

    let mut s = session.lock().await;
    match s.finish_action(transition, result) {
        Ok(relationship) => HttpResponse::Ok().json(ConnectionActionResponse {
            professional_id: req.professional_id.clone(),
            relationship,
            actions: s.relationships().available_actions(&req.professional_id),
        }),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, "Action failed", e.to_string()),
    }
}

/// The view action on a connected professional
async fn open_connection(state: web::Data<AppState>, path: web::Path<(String, String)>) -> impl Responder {
    let (viewer_id, professional_id) = path.into_inner();
    let Some(session) = state.sessions.existing(&viewer_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            "Unknown session",
            format!("No discovery session for {}; refresh first", viewer_id),
        );
    };

    let result = session.lock().await.open_connection(&professional_id);
    match result {
        Ok(connection_id) => HttpResponse::Ok().json(OpenConnectionResponse {
            professional_id,
            connection_id,
        }),
        Err(e) => error_response(StatusCode::NOT_FOUND, "Not connected", e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ServiceCatalog;
    use crate::models::{Candidate, CandidateFilter, Connection, ConnectionRequest};
    use crate::services::{BackendError, RemovalOutcome, RequestOutcome};
    use actix_web::{test, App};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StaticBackend;

    #[async_trait]
    impl Backend for StaticBackend {
        async fn fetch_candidates(&self, _filter: &CandidateFilter) -> Result<Vec<Candidate>, BackendError> {
            Ok(vec![Candidate::from_payload(json!({
                "$id": "pro-1",
                "name": "Ada",
                "category": "Electrician",
                "latitude": 6.5244,
                "longitude": 3.3792,
                "city": "Lagos",
                "isVerified": true
            }))
            .unwrap()])
        }

        async fn fetch_pending_requests(&self, _viewer_id: &str) -> Result<Vec<ConnectionRequest>, BackendError> {
            Ok(vec![])
        }

        async fn fetch_connections(&self, viewer_id: &str) -> Result<Vec<Connection>, BackendError> {
            if viewer_id != "viewer-connected" {
                return Ok(vec![]);
            }
            Ok(vec![Connection {
                id: "conn-1".to_string(),
                requester_id: viewer_id.to_string(),
                professional_id: "pro-1".to_string(),
            }])
        }

        async fn create_connection_request(&self, _v: &str, _p: &str) -> Result<RequestOutcome, BackendError> {
            Ok(RequestOutcome::AlreadyRequested)
        }

        async fn cancel_connection_request(&self, _v: &str, _p: &str) -> Result<RemovalOutcome, BackendError> {
            Err(BackendError::ApiError("unavailable".to_string()))
        }

        async fn remove_connection(&self, _id: &str) -> Result<RemovalOutcome, BackendError> {
            Ok(RemovalOutcome::Removed)
        }

        async fn fetch_candidate_detail(&self, id: &str) -> Result<Candidate, BackendError> {
            Err(BackendError::NotFound(id.to_string()))
        }
    }

    fn app_state() -> AppState {
        let catalog = Arc::new(ServiceCatalog::builtin());
        AppState {
            backend: Arc::new(StaticBackend),
            sessions: Arc::new(SessionStore::new(catalog.clone(), 100, 60, chrono::Duration::minutes(10))),
            matcher: ServiceMatcher::new(catalog),
        }
    }

    #[actix_web::test]
    async fn test_search_endpoint() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/services/search?q=wirin")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["results"][0]["name"], "Electrician");
        assert_eq!(body["results"][0]["matchType"], "synonym");
    }

    #[actix_web::test]
    async fn test_refresh_then_send_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/discovery/refresh")
            .set_json(json!({
                "viewerId": "viewer-1",
                "city": "lagos",
                "origin": { "lat": 6.5244, "lng": 3.3792 }
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let entry = &body["entries"][0];
        assert_eq!(entry["id"], "pro-1");
        assert_eq!(entry["distanceKm"], 0.0);
        assert_eq!(entry["tier"], "sameCity");
        assert_eq!(entry["relationship"], "none");
        assert_eq!(entry["verification"]["fullyVerified"], true);
        assert_eq!(body["stale"], false);

        let req = test::TestRequest::post()
            .uri("/api/v1/connections/request")
            .set_json(json!({ "viewerId": "viewer-1", "professionalId": "pro-1" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["relationship"], "pending");
        assert_eq!(body["actions"], json!(["cancelRequest"]));

        let req = test::TestRequest::post()
            .uri("/api/v1/connections/cancel")
            .set_json(json!({ "viewerId": "viewer-1", "professionalId": "pro-1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn test_action_without_session() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/connections/request")
            .set_json(json!({ "viewerId": "nobody", "professionalId": "pro-1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_refresh_reuses_ticket_from_state_change() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        // New viewer, origin and service each start a refresh; no extra one is issued
        let req = test::TestRequest::post()
            .uri("/api/v1/discovery/refresh")
            .set_json(json!({
                "viewerId": "viewer-1",
                "origin": { "lat": 6.5244, "lng": 3.3792 },
                "service": "wiring"
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stale"], false);
        assert_eq!(body["entries"][0]["id"], "pro-1");

        let session = state.sessions.existing("viewer-1").await.unwrap();
        assert_eq!(session.lock().await.generation(), 3);

        // Nothing changed: a single user-requested refresh
        let req = test::TestRequest::post()
            .uri("/api/v1/discovery/refresh")
            .set_json(json!({
                "viewerId": "viewer-1",
                "origin": { "lat": 6.5244, "lng": 3.3792 },
                "service": "wiring"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(session.lock().await.generation(), 4);
    }

    #[actix_web::test]
    async fn test_open_connection_endpoint() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/discovery/refresh")
            .set_json(json!({ "viewerId": "viewer-connected" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["entries"][0]["relationship"], "connected");

        let req = test::TestRequest::get()
            .uri("/api/v1/connections/viewer-connected/pro-1")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "professionalId": "pro-1", "connectionId": "conn-1" }));

        let req = test::TestRequest::get()
            .uri("/api/v1/connections/viewer-connected/pro-2")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
