//! Router configuration for the HTTP API.
//!
//! Only the enabled API generations get routes; a disabled generation
//! answers the JSON 404 of any unknown path.

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;
use crate::config::ApiVersion;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Read-only public API
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check));

    if state.api_versions.contains(ApiVersion::V1) {
        router = router
            .route("/api/v1/help", get(handlers::v1_help))
            .route("/api/v1/oid/full/json", get(handlers::v1_oid_full))
            .route("/api/v1/circle/full/json", get(handlers::v1_circle_full))
            .route("/api/v1/circle/oid/json", get(handlers::v1_circle_oid));
    }
    if state.api_versions.contains(ApiVersion::V2) {
        router = router
            .route("/api/v2/help", get(handlers::v2_help))
            .route("/api/v2/oid/full/json", get(handlers::v2_oid_full))
            .route("/api/v2/circle/full/json", get(handlers::v2_circle_full));
    }
    if state.api_versions.contains(ApiVersion::V3) {
        router = router
            .route("/api/v3/help", get(handlers::v3_help))
            .route("/api/v3/dr/list/json", get(handlers::v3_release_list))
            .route(
                "/api/v3/data/{dr}/oid/full/json",
                get(handlers::v3_oid_full),
            )
            .route(
                "/api/v3/data/{dr}/circle/full/json",
                get(handlers::v3_circle_full),
            );
    }

    router
        .fallback(handlers::not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiVersions;
    use crate::db::releases::ReleaseCatalogue;
    use crate::services::FederationEngine;

    #[test]
    fn test_router_creation() {
        let state = AppState::new(
            FederationEngine::default(),
            ReleaseCatalogue::standard(),
            ApiVersions::all(),
        );
        let _router = create_router(state);
    }
}
