//! Backend gateway trait.
//!
//! A [`SpatialBackend`] executes the fixed query shapes the federation engine
//! needs against one backend family. Implementations own their connection
//! handling (pooling, retries); the engine only sees rows.
//!
//! # Ordering contract
//!
//! - [`SpatialBackend::fetch_object_observations`] returns rows ordered by `mjd`.
//! - [`SpatialBackend::fetch_region_observations`] returns rows ordered by
//!   [`RegionPredicate::ordering`], so every object's rows form one
//!   contiguous run.
//! - [`SpatialBackend::fetch_region_object_ids`] returns ids ascending.

use async_trait::async_trait;

use crate::db::predicate::RegionPredicate;
use crate::db::releases::{BackendKind, ReleaseDescriptor};
use crate::error::FederationResult;
use crate::models::{ObjectId, ObservationRow, RegionQuery, ShortSummaryRow, SummaryRow};

/// In-flight query limit used when a backend does not report one.
pub const DEFAULT_CAPACITY: usize = 8;

/// Read-only gateway to one backend family.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one instance serves every request.
#[async_trait]
pub trait SpatialBackend: Send + Sync {
    /// Which predicate family this backend understands.
    fn kind(&self) -> BackendKind;

    /// How many queries may usefully run at once (pool size).
    fn capacity(&self) -> usize {
        DEFAULT_CAPACITY
    }

    /// Build the region filter for this backend.
    fn region_predicate(&self, query: &RegionQuery) -> FederationResult<RegionPredicate> {
        RegionPredicate::build(self.kind(), query)
    }

    /// Probe connectivity with a trivial query.
    async fn health_check(&self) -> FederationResult<()>;

    /// Batch-fetch summaries for `ids` from the release's summary table.
    ///
    /// Ids without a summary row are simply absent from the result. The
    /// release's quality cuts on summaries apply.
    async fn fetch_summaries(
        &self,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<SummaryRow>>;

    /// Batch-fetch short-window summaries from `table`.
    async fn fetch_short_summaries(
        &self,
        table: &str,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<ShortSummaryRow>>;

    /// Observations of one object, located by id plus the summary's cell
    /// index when the backend has one.
    async fn fetch_object_observations(
        &self,
        release: &ReleaseDescriptor,
        summary: &SummaryRow,
    ) -> FederationResult<Vec<ObservationRow>>;

    /// All observations inside the region, in one ordered pass.
    async fn fetch_region_observations(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObservationRow>>;

    /// Ids of summarized objects inside the region, ascending.
    async fn fetch_region_object_ids(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObjectId>>;
}
