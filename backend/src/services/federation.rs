//! Record join & projection engine.
//!
//! Turns backend rows into the public `{oid: {meta, lc}}` mapping for the two
//! query shapes:
//!
//! - **by identifier**: one batched summary query, then one observation
//!   query per retained object, run concurrently up to the backend's
//!   capacity;
//! - **by region**: one ordered observation pass, one batched summary query,
//!   a consistency check, then a single linear grouping pass.
//!
//! Every entry point runs under the request deadline; when it expires the
//! in-flight sub-queries are dropped with it.

use futures::{stream, StreamExt, TryStreamExt};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::consistency::ensure_same_objects;
use super::projection::{project_observation, project_summary};
use crate::db::releases::{BackendKind, ReleaseDescriptor};
use crate::db::repository::SpatialBackend;
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{
    LightCurves, ObjectId, ObjectRecord, ObservationRow, RegionQuery, ShortSummaryRow,
    SummaryRow,
};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Federates the analytic and indexed backends behind one interface.
#[derive(Clone)]
pub struct FederationEngine {
    analytic: Option<Arc<dyn SpatialBackend>>,
    indexed: Option<Arc<dyn SpatialBackend>>,
    request_timeout: Duration,
}

impl Default for FederationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl FederationEngine {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            analytic: None,
            indexed: None,
            request_timeout,
        }
    }

    /// Attach a backend; it serves every release of its family.
    pub fn with_backend(mut self, backend: Arc<dyn SpatialBackend>) -> Self {
        match backend.kind() {
            BackendKind::Analytic => self.analytic = Some(backend),
            BackendKind::Indexed => self.indexed = Some(backend),
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Attached backends, analytic first.
    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn SpatialBackend>> {
        self.analytic.iter().chain(self.indexed.iter())
    }

    pub fn backend_for(
        &self,
        release: &ReleaseDescriptor,
    ) -> FederationResult<&Arc<dyn SpatialBackend>> {
        let slot = match release.backend {
            BackendKind::Analytic => &self.analytic,
            BackendKind::Indexed => &self.indexed,
        };
        slot.as_ref().ok_or_else(|| {
            FederationError::unavailable_with_context(
                format!("no {} backend is configured", release.backend),
                ErrorContext::new("backend_for").with_release(release.name.as_str()),
            )
        })
    }

    /// Summary and light curve of each requested object.
    ///
    /// Objects without a summary are left out; any backend failure fails the
    /// whole request.
    pub async fn objects_by_id(
        &self,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<LightCurves> {
        self.with_deadline("objects_by_id", release, self.join_by_id(release, ids))
            .await
    }

    /// Every object with observations inside the region.
    pub async fn objects_in_region(
        &self,
        release: &ReleaseDescriptor,
        query: &RegionQuery,
    ) -> FederationResult<LightCurves> {
        self.with_deadline(
            "objects_in_region",
            release,
            self.join_by_region(release, query),
        )
        .await
    }

    /// Ids of summarized objects inside the region, ascending.
    pub async fn object_ids_in_region(
        &self,
        release: &ReleaseDescriptor,
        query: &RegionQuery,
    ) -> FederationResult<Vec<ObjectId>> {
        self.with_deadline("object_ids_in_region", release, async {
            let backend = self.backend_for(release)?;
            let predicate = backend.region_predicate(query)?;
            backend.fetch_region_object_ids(release, &predicate).await
        })
        .await
    }

    async fn with_deadline<T, F>(
        &self,
        operation: &str,
        release: &ReleaseDescriptor,
        fut: F,
    ) -> FederationResult<T>
    where
        F: Future<Output = FederationResult<T>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "{} on {} exceeded {:?}",
                    operation,
                    release.name,
                    self.request_timeout
                );
                Err(FederationError::TimeoutError {
                    message: format!("request exceeded {:?}", self.request_timeout),
                    context: ErrorContext::new(operation).with_release(release.name.as_str()),
                })
            }
        }
    }

    async fn join_by_id(
        &self,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<LightCurves> {
        let backend = self.backend_for(release)?;
        if ids.is_empty() {
            return Ok(LightCurves::new());
        }

        let summaries = backend.fetch_summaries(release, ids).await?;
        log::debug!(
            "{} of {} requested object(s) found in {}",
            summaries.len(),
            ids.len(),
            release.name
        );
        let retained: Vec<ObjectId> = summaries.iter().map(|s| s.oid).collect();
        let short = self.short_summaries(backend, release, &retained).await?;

        let joined: Vec<(SummaryRow, Vec<ObservationRow>)> = stream::iter(summaries)
            .map(|summary| async move {
                let rows = backend.fetch_object_observations(release, &summary).await?;
                Ok::<_, FederationError>((summary, rows))
            })
            .buffered(backend.capacity().max(1))
            .try_collect()
            .await?;

        let mut records = LightCurves::new();
        for (summary, rows) in joined {
            let meta = project_summary(&summary, short.get(&summary.oid))?;
            let lc = rows
                .iter()
                .map(|row| project_observation(release.schema, row))
                .collect();
            records.insert(summary.oid, ObjectRecord { meta, lc });
        }
        Ok(records)
    }

    async fn join_by_region(
        &self,
        release: &ReleaseDescriptor,
        query: &RegionQuery,
    ) -> FederationResult<LightCurves> {
        let backend = self.backend_for(release)?;
        let predicate = backend.region_predicate(query)?;

        let rows = backend.fetch_region_observations(release, &predicate).await?;
        if rows.is_empty() {
            return Ok(LightCurves::new());
        }

        let observed: BTreeSet<ObjectId> = rows.iter().map(|r| r.oid).collect();
        let ids: Vec<ObjectId> = observed.iter().copied().collect();
        let summaries = backend.fetch_summaries(release, &ids).await?;
        let summarized: BTreeSet<ObjectId> = summaries.iter().map(|s| s.oid).collect();
        ensure_same_objects(&observed, &summarized, &release.name)?;

        log::debug!(
            "Region query on {} matched {} observation(s) of {} object(s)",
            release.name,
            rows.len(),
            ids.len()
        );

        let short = self.short_summaries(backend, release, &ids).await?;
        let summaries: HashMap<ObjectId, SummaryRow> =
            summaries.into_iter().map(|s| (s.oid, s)).collect();

        group_contiguous(rows, |oid, lc| {
            let summary = summaries.get(&oid).ok_or_else(|| {
                FederationError::inconsistency_with_context(
                    "object lost its summary while grouping",
                    ErrorContext::new("group_observations").with_object_id(oid),
                )
            })?;
            Ok(ObjectRecord {
                meta: project_summary(summary, short.get(&oid))?,
                lc: lc
                    .iter()
                    .map(|row| project_observation(release.schema, row))
                    .collect(),
            })
        })
        .map_err(|e| e.with_release(release.name.as_str()))
    }

    async fn short_summaries(
        &self,
        backend: &Arc<dyn SpatialBackend>,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<HashMap<ObjectId, ShortSummaryRow>> {
        match &release.short_summary_table {
            Some(table) if !ids.is_empty() => Ok(backend
                .fetch_short_summaries(table, ids)
                .await?
                .into_iter()
                .map(|s| (s.oid, s))
                .collect()),
            _ => Ok(HashMap::new()),
        }
    }
}

/// Group rows into per-object records in one pass.
///
/// Rows of one object must be contiguous; a second run of the same id means
/// the backend broke its ordering contract.
fn group_contiguous<F>(rows: Vec<ObservationRow>, mut build: F) -> FederationResult<LightCurves>
where
    F: FnMut(ObjectId, Vec<ObservationRow>) -> FederationResult<ObjectRecord>,
{
    let mut records = LightCurves::new();
    let mut run: Vec<ObservationRow> = Vec::new();

    let mut flush = |run: Vec<ObservationRow>, records: &mut LightCurves| -> FederationResult<()> {
        let Some(oid) = run.first().map(|r| r.oid) else {
            return Ok(());
        };
        let record = build(oid, run)?;
        if records.insert(oid, record).is_some() {
            return Err(FederationError::inconsistency_with_context(
                "observations of one object are not contiguous",
                ErrorContext::new("group_observations").with_object_id(oid),
            ));
        }
        Ok(())
    };

    for row in rows {
        if run.last().is_some_and(|last| last.oid != row.oid) {
            flush(std::mem::take(&mut run), &mut records)?;
        }
        run.push(row);
    }
    flush(run, &mut records)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(oid: u64, mjd: f64) -> ObservationRow {
        ObservationRow {
            oid: ObjectId(oid),
            mjd,
            mag: 18.0,
            magerr: 0.1,
            clrcoeff: 0.0,
            catflags: 0,
        }
    }

    fn record(lc: &[ObservationRow]) -> ObjectRecord {
        ObjectRecord {
            meta: crate::models::ObjectSummary {
                nobs: lc.len() as i64,
                ngoodobs: lc.len() as i64,
                duration: 0.0,
                filter: crate::models::Passband::Zg,
                fieldid: 1,
                rcid: 1,
                coord: crate::models::SphericalPoint::new(0.0, 0.0).unwrap(),
                h3: None,
                ngoodobs_short: None,
                duration_short: None,
            },
            lc: lc
                .iter()
                .map(|r| project_observation(crate::db::releases::SchemaVersion::V3, r))
                .collect(),
        }
    }

    #[test]
    fn test_group_contiguous_runs() {
        let rows = vec![row(5, 1.0), row(5, 2.0), row(3, 1.5), row(9, 0.5)];
        let records = group_contiguous(rows, |_, lc| Ok(record(&lc))).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[&ObjectId(5)].lc.len(), 2);
        assert_eq!(records[&ObjectId(3)].lc[0].mjd, 1.5);
    }

    #[test]
    fn test_group_rejects_split_runs() {
        let rows = vec![row(5, 1.0), row(3, 1.5), row(5, 2.0)];
        let err = group_contiguous(rows, |_, lc| Ok(record(&lc))).unwrap_err();
        assert!(matches!(err, FederationError::InternalInconsistency { .. }));
    }

    #[test]
    fn test_group_empty() {
        let records = group_contiguous(Vec::new(), |_, lc| Ok(record(&lc))).unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_missing_backend_is_unavailable() {
        let engine = FederationEngine::default();
        let release = ReleaseDescriptor::indexed("dr8", false);
        let err = engine.objects_by_id(&release, &[ObjectId(1)]).await.unwrap_err();
        assert!(matches!(err, FederationError::BackendUnavailable { .. }));
    }
}
