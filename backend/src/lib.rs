//! # ZTF light-curve federation
//!
//! Serves ZTF light curves from two independently built backends behind one
//! API: a relational store with pg_sphere geometry (DR1) and a columnar
//! store indexed by H3 hex cells (DR2 onwards).
//!
//! ## Architecture
//!
//! - [`models`]: coordinates, identifiers, backend rows and output records
//! - [`db`]: coordinate codec, region predicates, release resolver and the
//!   backend implementations
//! - [`services`]: join and projection engine, consistency guard
//! - [`config`]: TOML plus environment configuration
//! - [`http`]: axum router for the v1, v2 and v3 APIs

#![allow(clippy::result_large_err)]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;

pub use config::ServiceConfig;
pub use error::{ErrorContext, FederationError, FederationResult};
pub use services::FederationEngine;
