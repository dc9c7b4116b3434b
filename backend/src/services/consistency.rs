//! Cross-query consistency guard.
//!
//! The region path reads observations and summaries in two independent
//! queries. If the two disagree on which objects exist the response would
//! be silently wrong, so the request fails instead.

use std::collections::BTreeSet;

use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::ObjectId;

/// Require the observed id set to equal the summarized id set.
pub fn ensure_same_objects(
    observed: &BTreeSet<ObjectId>,
    summarized: &BTreeSet<ObjectId>,
    release: &str,
) -> FederationResult<()> {
    if observed == summarized {
        return Ok(());
    }

    let without_summary: Vec<String> = observed
        .difference(summarized)
        .map(ObjectId::to_string)
        .collect();
    let without_observations: Vec<String> = summarized
        .difference(observed)
        .map(ObjectId::to_string)
        .collect();

    log::error!(
        "Observation and summary tables of {} disagree: {} id(s) without summary, {} without observations",
        release,
        without_summary.len(),
        without_observations.len()
    );

    Err(FederationError::inconsistency_with_context(
        "observation and summary tables disagree on the objects in the region",
        ErrorContext::new("ensure_same_objects")
            .with_release(release)
            .with_details(format!(
                "without_summary=[{}], without_observations=[{}]",
                without_summary.join(","),
                without_observations.join(",")
            )),
    ))
}
