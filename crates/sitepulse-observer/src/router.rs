//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /ws/sites` -- `WebSocket` snapshot stream and request channel
/// - `GET /api/sites` -- current snapshot
/// - `POST /api/sites` -- add a site
/// - `GET /api/sites/{name}` -- single site
/// - `DELETE /api/sites/{name}` -- remove a site
/// - `PUT /api/sites/{name}/value` -- append a traffic value
/// - `GET /api/top` -- top-K ranking
///
/// CORS is configured to allow any origin so a dashboard served from
/// elsewhere can connect.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket
        .route("/ws/sites", get(ws::ws_sites))
        // REST API
        .route(
            "/api/sites",
            get(handlers::list_sites).post(handlers::add_site),
        )
        .route(
            "/api/sites/{name}",
            get(handlers::get_site).delete(handlers::remove_site),
        )
        .route("/api/sites/{name}/value", put(handlers::set_value))
        .route("/api/top", get(handlers::top_sites))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
