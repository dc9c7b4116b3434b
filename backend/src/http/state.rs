//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::ApiVersions;
use crate::db::releases::{ReleaseCatalogue, ReleaseDescriptor};
use crate::services::FederationEngine;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FederationEngine>,
    /// Releases served by the v3 endpoints
    pub catalogue: Arc<ReleaseCatalogue>,
    pub api_versions: ApiVersions,
    /// Fixed release behind the v1 endpoints
    pub v1_release: Arc<ReleaseDescriptor>,
    /// Fixed release behind the v2 endpoints
    pub v2_release: Arc<ReleaseDescriptor>,
}

impl AppState {
    /// State with the standard v1/v2 releases.
    pub fn new(
        engine: FederationEngine,
        catalogue: ReleaseCatalogue,
        api_versions: ApiVersions,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            catalogue: Arc::new(catalogue),
            api_versions,
            v1_release: Arc::new(ReleaseDescriptor::dr1()),
            v2_release: Arc::new(ReleaseDescriptor::dr2_legacy()),
        }
    }
}
