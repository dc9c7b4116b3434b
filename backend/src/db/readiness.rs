//! Startup readiness probe.
//!
//! Backends may start after the service (containers coming up together), so
//! the first health check is retried at a fixed interval until an overall
//! deadline. Only retryable faults are waited out.

use std::time::Duration;
use tokio::time::Instant;

use crate::db::repository::SpatialBackend;
use crate::error::{ErrorContext, FederationError, FederationResult};

/// How long and how often to probe a backend at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Overall deadline
    pub wait_for: Duration,
    /// Pause between attempts
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            wait_for: Duration::from_secs(900),
            interval: Duration::from_secs(1),
        }
    }
}

/// Probe `backend` until it answers or the deadline passes.
///
/// Returns the number of attempts it took. Non-retryable faults are returned
/// immediately; an expired deadline becomes `BackendUnavailable`.
pub async fn wait_until_ready(
    backend: &dyn SpatialBackend,
    policy: ReadinessPolicy,
) -> FederationResult<u32> {
    let deadline = Instant::now() + policy.wait_for;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match backend.health_check().await {
            Ok(()) => {
                log::info!(
                    "{} backend ready after {} attempt(s)",
                    backend.kind(),
                    attempts
                );
                return Ok(attempts);
            }
            Err(e) if e.is_retryable() => {
                if Instant::now() + policy.interval > deadline {
                    log::error!("{} backend still unavailable: {}", backend.kind(), e);
                    return Err(FederationError::unavailable_with_context(
                        format!(
                            "backend did not become ready within {:?}: {}",
                            policy.wait_for, e
                        ),
                        ErrorContext::new("wait_until_ready")
                            .with_details(format!("attempts={}", attempts)),
                    ));
                }
                log::debug!("{} backend not ready yet: {}", backend.kind(), e);
                tokio::time::sleep(policy.interval).await;
            }
            Err(e) => return Err(e.with_operation("wait_until_ready")),
        }
    }
}
