//! HTTP handlers for the REST API.
//!
//! Handlers only parse the request and pick the release; joining happens in
//! [`crate::services::FederationEngine`].

use axum::{
    extract::{Path, Query, State},
    http::Uri,
    response::Html,
    Json,
};
use std::collections::BTreeMap;

use super::dto::{HealthResponse, QueryPairs};
use super::error::AppError;
use super::help;
use super::state::AppState;
use crate::config::ApiVersion;
use crate::db::releases::ReleaseDescriptor;
use crate::models::{parse_object_ids, LightCurves, ObjectId, RegionQuery};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Service pages
// =============================================================================

/// Unrouted paths, including endpoints of disabled API versions.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No endpoint at {}", uri.path()))
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(help::index(state.api_versions.iter()))
}

/// GET /health
///
/// Probes every attached backend. Always answers 200; the body tells which
/// backend failed.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let mut backends = BTreeMap::new();
    let mut healthy = true;
    for backend in state.engine.backends() {
        let status = match backend.health_check().await {
            Ok(()) => "connected".to_string(),
            Err(e) => {
                healthy = false;
                format!("error: {}", e)
            }
        };
        backends.insert(backend.kind().to_string(), status);
    }

    Ok(Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backends,
    }))
}

pub async fn v1_help() -> Html<String> {
    Html(help::page(ApiVersion::V1))
}

pub async fn v2_help() -> Html<String> {
    Html(help::page(ApiVersion::V2))
}

pub async fn v3_help() -> Html<String> {
    Html(help::page(ApiVersion::V3))
}

// =============================================================================
// Shared query shapes
// =============================================================================

async fn objects_by_id(
    state: &AppState,
    release: &ReleaseDescriptor,
    query: &QueryPairs,
) -> HandlerResult<LightCurves> {
    let ids = parse_object_ids(&query.object_ids())?;
    let records = state.engine.objects_by_id(release, &ids).await?;
    Ok(Json(records))
}

async fn objects_in_region(
    state: &AppState,
    release: &ReleaseDescriptor,
    query: &QueryPairs,
) -> HandlerResult<LightCurves> {
    let region = RegionQuery::parse(&query.region())?;
    let records = state.engine.objects_in_region(release, &region).await?;
    Ok(Json(records))
}

// =============================================================================
// API v1 (relational backend, DR1)
// =============================================================================

/// GET /api/v1/oid/full/json
pub async fn v1_oid_full(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<LightCurves> {
    objects_by_id(&state, &state.v1_release, &query).await
}

/// GET /api/v1/circle/full/json
pub async fn v1_circle_full(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<LightCurves> {
    objects_in_region(&state, &state.v1_release, &query).await
}

/// GET /api/v1/circle/oid/json
pub async fn v1_circle_oid(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<Vec<ObjectId>> {
    let region = RegionQuery::parse(&query.region())?;
    let ids = state
        .engine
        .object_ids_in_region(&state.v1_release, &region)
        .await?;
    Ok(Json(ids))
}

// =============================================================================
// API v2 (hex-indexed backend, DR2)
// =============================================================================

/// GET /api/v2/oid/full/json
pub async fn v2_oid_full(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<LightCurves> {
    objects_by_id(&state, &state.v2_release, &query).await
}

/// GET /api/v2/circle/full/json
pub async fn v2_circle_full(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<LightCurves> {
    objects_in_region(&state, &state.v2_release, &query).await
}

// =============================================================================
// API v3 (hex-indexed backend, any release)
// =============================================================================

/// GET /api/v3/dr/list/json
pub async fn v3_release_list(State(state): State<AppState>) -> HandlerResult<Vec<String>> {
    Ok(Json(
        state.catalogue.list().into_iter().map(String::from).collect(),
    ))
}

/// GET /api/v3/data/{dr}/oid/full/json
pub async fn v3_oid_full(
    State(state): State<AppState>,
    Path(dr): Path<String>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<LightCurves> {
    let release = state.catalogue.resolve(&dr)?;
    objects_by_id(&state, release, &query).await
}

/// GET /api/v3/data/{dr}/circle/full/json
pub async fn v3_circle_full(
    State(state): State<AppState>,
    Path(dr): Path<String>,
    Query(query): Query<QueryPairs>,
) -> HandlerResult<LightCurves> {
    let release = state.catalogue.resolve(&dr)?;
    objects_in_region(&state, release, &query).await
}
