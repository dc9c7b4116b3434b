//! Backend implementations.
//!
//! This module contains the implementations of the `SpatialBackend` trait:
//! - `postgres`: pg_sphere tables through Diesel (analytic family)
//! - `clickhouse`: hex-indexed tables over HTTP (indexed family)
//! - `local`: In-memory implementation for unit testing and local development
#[cfg(feature = "clickhouse-repo")]
pub mod clickhouse;
pub mod local;
#[cfg(feature = "postgres-repo")]
pub mod postgres;

#[cfg(feature = "clickhouse-repo")]
pub use clickhouse::{ClickHouseBackend, ClickHouseConfig};
pub use local::{LocalBackend, Placement};
#[cfg(feature = "postgres-repo")]
pub use postgres::{PostgresBackend, PostgresConfig};
