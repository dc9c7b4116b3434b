//! Backend access layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  FederationEngine (services/)                           │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  SpatialBackend trait (repository/)                     │
//! │  - fixed query shapes, ordering contract                │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼────────────────┬──────────────────┐
//!     │  Postgres     │  ClickHouse    │  Local           │
//!     │  (pg_sphere)  │  (H3 cells)    │  (in-memory)     │
//!     └───────────────┴────────────────┴──────────────────┘
//! ```
//!
//! - `codec`: pg_sphere text format for points and circles
//! - `predicate`: region filters for both backend families
//! - `releases`: release descriptors and the release resolver
//! - `readiness`: startup probe loop
//! - `factory`: builds backends from the service configuration

#[cfg(not(any(
    feature = "postgres-repo",
    feature = "clickhouse-repo",
    feature = "local-repo"
)))]
compile_error!("Enable at least one repository backend feature.");

pub mod codec;
pub mod factory;
pub mod predicate;
pub mod readiness;
pub mod releases;
pub mod repositories;
pub mod repository;

pub use codec::{PgSphere, WireCodec};
pub use factory::BackendFactory;
pub use predicate::{AnalyticPredicate, IndexedPredicate, RegionPredicate, H3_RESOLUTION};
pub use readiness::{wait_until_ready, ReadinessPolicy};
pub use releases::{BackendKind, ReleaseCatalogue, ReleaseDescriptor, SchemaVersion};
pub use repository::SpatialBackend;
