//! Backend factory.
//!
//! Builds one [`SpatialBackend`] per backend family the enabled API versions
//! need, from the service configuration.

use std::sync::Arc;

use super::releases::BackendKind;
#[cfg(feature = "clickhouse-repo")]
use super::repositories::ClickHouseBackend;
use super::repositories::LocalBackend;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresBackend;
use super::repository::SpatialBackend;
use crate::config::{RepositoryType, ServiceConfig};
use crate::error::{FederationError, FederationResult};

/// Factory for backend instances.
///
/// # Example
/// ```
/// use ztf_lc::config::RepositoryType;
/// use ztf_lc::db::factory::BackendFactory;
/// use ztf_lc::db::releases::BackendKind;
/// use ztf_lc::db::repository::SpatialBackend;
/// use ztf_lc::ServiceConfig;
///
/// let config = ServiceConfig::default();
/// let backend = BackendFactory::create(BackendKind::Indexed, RepositoryType::Local, &config).unwrap();
/// assert_eq!(backend.kind(), BackendKind::Indexed);
/// ```
pub struct BackendFactory;

impl BackendFactory {
    /// Every backend the configured API versions need, analytic first.
    pub fn from_config(config: &ServiceConfig) -> FederationResult<Vec<Arc<dyn SpatialBackend>>> {
        let versions = config.api_versions()?;
        let repo_type = config.repository_type()?;

        let mut kinds = Vec::new();
        if versions.needs_analytic() {
            kinds.push(BackendKind::Analytic);
        }
        if versions.needs_indexed() {
            kinds.push(BackendKind::Indexed);
        }

        kinds
            .into_iter()
            .map(|kind| Self::create(kind, repo_type, config))
            .collect()
    }

    /// Create the backend of one family.
    pub fn create(
        kind: BackendKind,
        repo_type: RepositoryType,
        config: &ServiceConfig,
    ) -> FederationResult<Arc<dyn SpatialBackend>> {
        log::info!("Creating {} backend ({:?})", kind, repo_type);
        match (repo_type, kind) {
            (RepositoryType::Local, kind) => Self::create_local(kind),
            (RepositoryType::Remote, BackendKind::Analytic) => Self::create_postgres(config),
            (RepositoryType::Remote, BackendKind::Indexed) => Self::create_clickhouse(config),
        }
    }

    /// Create an empty in-memory backend.
    pub fn create_local(kind: BackendKind) -> FederationResult<Arc<dyn SpatialBackend>> {
        Ok(Arc::new(LocalBackend::new(kind)))
    }

    #[cfg(feature = "postgres-repo")]
    fn create_postgres(config: &ServiceConfig) -> FederationResult<Arc<dyn SpatialBackend>> {
        let backend = PostgresBackend::new(config.postgres_config()?)?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "postgres-repo"))]
    fn create_postgres(_config: &ServiceConfig) -> FederationResult<Arc<dyn SpatialBackend>> {
        Err(FederationError::configuration(
            "API v1 needs the postgres-repo feature",
        ))
    }

    #[cfg(feature = "clickhouse-repo")]
    fn create_clickhouse(config: &ServiceConfig) -> FederationResult<Arc<dyn SpatialBackend>> {
        let backend = ClickHouseBackend::new(config.clickhouse_config())?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "clickhouse-repo"))]
    fn create_clickhouse(_config: &ServiceConfig) -> FederationResult<Arc<dyn SpatialBackend>> {
        Err(FederationError::configuration(
            "API v2 and v3 need the clickhouse-repo feature",
        ))
    }
}
