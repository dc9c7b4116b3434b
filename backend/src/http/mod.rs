//! HTTP server module.
//!
//! An axum router over the federation engine. Handlers parse query strings,
//! resolve the release and serialize the engine's records; every fault maps
//! to a status code in [`error`].
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  HTTP Layer (axum handlers)                  │
//! │  - query parsing, release selection          │
//! │  - CORS, compression, tracing, error mapping │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  FederationEngine (services/)                │
//! │  - join, projection, consistency guard       │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  SpatialBackend (db/)                        │
//! │  - Postgres / ClickHouse / in-memory         │
//! └──────────────────────────────────────────────┘
//! ```

pub mod dto;
pub mod error;
pub mod handlers;
pub mod help;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
