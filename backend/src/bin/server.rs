//! ZTF light-curve HTTP server.
//!
//! Loads the configuration, connects the backends the enabled API versions
//! need, waits for them to answer and starts serving.
//!
//! # Usage
//!
//! ```bash
//! # In-memory backends (default)
//! cargo run --bin ztf-lc-server
//!
//! # Postgres for v1, ClickHouse for v2/v3
//! REPOSITORY_TYPE=remote DATABASE_URL=postgres://app@db/ztf CLICKHOUSE_URL=http://ch:8123 \
//!   cargo run --bin ztf-lc-server --features "postgres-repo,clickhouse-repo"
//! ```
//!
//! # Environment Variables
//!
//! - `HOST`, `PORT`: bind address (default 0.0.0.0:8080)
//! - `API_VERSION`: `all` or a `:`-separated subset of v1, v2, v3
//! - `LATEST_DR`, `AVAILABLE_DRS`: release alias and restriction for v3
//! - `RUST_LOG`: log filter (default: info)
//!
//! See [`ztf_lc::config`] for the full list.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ztf_lc::db::{wait_until_ready, BackendFactory};
use ztf_lc::http::{create_router, AppState};
use ztf_lc::{FederationEngine, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting ZTF light-curve server");

    let config = ServiceConfig::load().context("invalid configuration")?;
    let api_versions = config.api_versions()?;
    let catalogue = config.catalogue()?;
    info!(
        "API versions: {}",
        api_versions
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let policy = config.readiness_policy();
    let mut engine = FederationEngine::new(config.request_timeout());
    for backend in BackendFactory::from_config(&config)? {
        wait_until_ready(backend.as_ref(), policy)
            .await
            .with_context(|| format!("{} backend never became ready", backend.kind()))?;
        engine = engine.with_backend(backend);
    }

    let state = AppState::new(engine, catalogue, api_versions);
    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
