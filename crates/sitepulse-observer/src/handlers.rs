//! REST API endpoint handlers for the Observer server.
//!
//! Reads take a fresh snapshot from the shared [`SiteStore`]; mutations
//! call the store directly and rely on its publisher to push the result
//! to `WebSocket` clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/sites` | Current snapshot (`?q=` name filter) |
//! | `POST` | `/api/sites` | Add a site |
//! | `GET` | `/api/sites/{name}` | Single site |
//! | `DELETE` | `/api/sites/{name}` | Remove a site |
//! | `PUT` | `/api/sites/{name}/value` | Append a new traffic value |
//! | `GET` | `/api/top` | Top-K ranking (`?k=`) |
//!
//! Malformed query strings and bodies are answered with the same JSON
//! error shape as store failures.
//!
//! [`SiteStore`]: sitepulse_core::SiteStore

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sitepulse_core::{auto_logo_ref, ranking, SiteStore, StoreError};
use tracing::warn;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/sites` and the `add_site` socket event.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AddSiteRequest {
    /// Site name.
    pub name: String,
    /// Logo reference; generated from the name when omitted.
    #[serde(default)]
    pub logo: Option<String>,
    /// Initial traffic, in billions.
    pub value: f64,
}

impl AddSiteRequest {
    /// Add the site to `store`.
    ///
    /// # Errors
    ///
    /// Propagates the store's rejection.
    pub fn apply(&self, store: &SiteStore) -> Result<(), StoreError> {
        let logo = self
            .logo
            .as_deref()
            .filter(|logo| !logo.trim().is_empty())
            .map_or_else(|| auto_logo_ref(&self.name), ToOwned::to_owned);
        store.add_site(&self.name, &logo, self.value)
    }
}

/// Request body for `PUT /api/sites/{name}/value`.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct SetValueBody {
    /// New traffic value, in billions.
    pub value: f64,
}

/// Query parameters for `GET /api/sites`.
#[derive(Debug, serde::Deserialize)]
pub struct SitesQuery {
    /// Case-insensitive substring filter on site names.
    pub q: Option<String>,
}

/// Query parameters for `GET /api/top`.
#[derive(Debug, serde::Deserialize)]
pub struct TopQuery {
    /// How many sites to return. Values `<= 0` yield an empty ranking.
    pub k: Option<i64>,
}

/// Generic mutation response.
#[derive(Debug, serde::Serialize)]
struct MutationResponse {
    /// Always `true`; failures return an error body instead.
    ok: bool,
    /// Human-readable message.
    message: String,
}

// ---------------------------------------------------------------------------
// GET /api/sites
// ---------------------------------------------------------------------------

/// Return the current snapshot, optionally filtered by name.
pub async fn list_sites(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SitesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Query(params) = params?;
    let mut snapshot = state.store.snapshot()?;

    if let Some(query) = params.q.as_deref() {
        let matched = snapshot.search(query).cloned().collect();
        snapshot.sites = matched;
    }

    Ok(Json(snapshot))
}

// ---------------------------------------------------------------------------
// GET /api/sites/{name}
// ---------------------------------------------------------------------------

/// Return a single site's windows and labels.
pub async fn get_site(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.store.snapshot()?;
    let site = snapshot
        .get(&name)
        .cloned()
        .ok_or_else(|| ObserverError::NotFound(format!("site not found: {name}")))?;
    Ok(Json(site))
}

// ---------------------------------------------------------------------------
// POST /api/sites
// ---------------------------------------------------------------------------

/// Add a site seeded with a short synthetic history.
pub async fn add_site(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddSiteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Json(body) = body?;
    body.apply(&state.store).inspect_err(|e| {
        warn!(site = body.name, error = %e, "Add-site request rejected");
    })?;

    Ok((
        StatusCode::CREATED,
        Json(MutationResponse {
            ok: true,
            message: format!("Site '{}' added", body.name.trim()),
        }),
    ))
}

// ---------------------------------------------------------------------------
// DELETE /api/sites/{name}
// ---------------------------------------------------------------------------

/// Remove a site. Removing an unknown site succeeds with `removed: false`.
pub async fn remove_site(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let removed = state.store.remove_site(&name)?;
    Ok(Json(serde_json::json!({
        "name": name,
        "removed": removed,
    })))
}

// ---------------------------------------------------------------------------
// PUT /api/sites/{name}/value
// ---------------------------------------------------------------------------

/// Append a new traffic value to a site.
pub async fn set_value(
    State(state): State<Arc<AppState>>,
    name: Result<Path<String>, PathRejection>,
    body: Result<Json<SetValueBody>, JsonRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Path(name) = name?;
    let Json(body) = body?;
    state.store.set_value(&name, body.value).inspect_err(|e| {
        warn!(site = name, error = %e, "Set-value request rejected");
    })?;

    Ok(Json(MutationResponse {
        ok: true,
        message: format!("Site '{name}' set to {}", body.value),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/top
// ---------------------------------------------------------------------------

/// Rank sites by their latest traffic value.
///
/// # Query Parameters
///
/// - `k`: number of sites (default from configuration; `<= 0` is empty).
pub async fn top_sites(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TopQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Query(params) = params?;
    let pairs = state.store.snapshot()?.latest_values();
    let ranked = match params.k {
        Some(k) => ranking::top_k_signed(&pairs, k),
        None => ranking::top_k(&pairs, state.default_top_k),
    };

    Ok(Json(serde_json::json!({
        "count": ranked.len(),
        "sites": ranked,
    })))
}
