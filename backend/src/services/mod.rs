//! Service layer: joins backend rows into the public light-curve records.
//!
//! Services sit between the HTTP handlers and the backends. They own no
//! state besides the attached backends and the request deadline.

pub mod consistency;
pub mod federation;
pub mod projection;

pub use consistency::ensure_same_objects;
pub use federation::{FederationEngine, DEFAULT_REQUEST_TIMEOUT};
pub use projection::{project_observation, project_summary};
