//! In-memory local backend.
//!
//! Stores summary, short-summary and observation tables in memory, keyed by
//! table name, and evaluates region predicates with their in-memory form.
//! Suitable for unit tests and local development: fast, deterministic and
//! isolated. It can impersonate either backend family.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::db::predicate::{cell_index, RegionPredicate};
use crate::db::releases::{BackendKind, QualityCuts, ReleaseDescriptor};
use crate::db::repository::{SpatialBackend, DEFAULT_CAPACITY};
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{
    ObjectId, ObservationRow, ShortSummaryRow, SphericalPoint, SummaryRow,
};

/// Where an observation was taken, as the indexed backend stores it per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub position: SphericalPoint,
    pub filter: i64,
    pub fieldid: i64,
}

impl Placement {
    pub fn of(summary: &SummaryRow) -> Self {
        Self {
            position: summary.coord,
            filter: summary.filter,
            fieldid: summary.fieldid,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObservation {
    row: ObservationRow,
    placement: Placement,
    h3index10: u64,
}

/// In-memory backend.
///
/// # Example
/// ```
/// use ztf_lc::db::releases::{BackendKind, ReleaseDescriptor};
/// use ztf_lc::db::repositories::LocalBackend;
///
/// let backend = LocalBackend::new(BackendKind::Indexed);
/// let release = ReleaseDescriptor::indexed("dr8", false);
/// assert_eq!(backend.summary_count(&release.summary_table), 0);
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    kind: BackendKind,
    capacity: usize,
    latency: Duration,
    data: Arc<RwLock<LocalData>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

#[derive(Default)]
struct LocalData {
    summaries: HashMap<String, BTreeMap<ObjectId, SummaryRow>>,
    short_summaries: HashMap<String, BTreeMap<ObjectId, ShortSummaryRow>>,
    observations: HashMap<String, Vec<StoredObservation>>,

    // Connection health
    is_healthy: bool,
    failing_probes: usize,
    failing_objects: BTreeSet<ObjectId>,
}

impl LocalBackend {
    /// Create a new empty backend of the given family.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            capacity: DEFAULT_CAPACITY,
            latency: Duration::ZERO,
            data: Arc::new(RwLock::new(LocalData {
                is_healthy: true,
                ..Default::default()
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Delay every data query by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add a summary row. Indexed backends get a cell index if it is missing.
    pub fn insert_summary(&self, table: &str, mut row: SummaryRow) -> FederationResult<()> {
        if self.kind == BackendKind::Indexed && row.h3index10.is_none() {
            row.h3index10 = Some(cell_index(&row.coord)?);
        }
        self.data
            .write()
            .summaries
            .entry(table.to_string())
            .or_default()
            .insert(row.oid, row);
        Ok(())
    }

    pub fn insert_short_summary(&self, table: &str, row: ShortSummaryRow) {
        self.data
            .write()
            .short_summaries
            .entry(table.to_string())
            .or_default()
            .insert(row.oid, row);
    }

    /// Add an observation taken at `placement`.
    pub fn insert_observation(
        &self,
        table: &str,
        row: ObservationRow,
        placement: Placement,
    ) -> FederationResult<()> {
        let h3index10 = cell_index(&placement.position)?;
        self.data
            .write()
            .observations
            .entry(table.to_string())
            .or_default()
            .push(StoredObservation {
                row,
                placement,
                h3index10,
            });
        Ok(())
    }

    /// Add one object to `release`: its summary and observations placed at
    /// the summary's position.
    pub fn insert_object(
        &self,
        release: &ReleaseDescriptor,
        summary: SummaryRow,
        observations: impl IntoIterator<Item = ObservationRow>,
    ) -> FederationResult<()> {
        let placement = Placement::of(&summary);
        for row in observations {
            self.insert_observation(&release.observation_table, row, placement.clone())?;
        }
        self.insert_summary(&release.summary_table, summary)
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Make the next `count` health probes fail as if the backend were still
    /// starting up.
    pub fn fail_health_checks(&self, count: usize) {
        self.data.write().failing_probes = count;
    }

    /// Make every observation fetch for `oid` fail with a query error.
    pub fn fail_observations_for(&self, oid: ObjectId) {
        self.data.write().failing_objects.insert(oid);
    }

    /// Clear all tables, keeping health settings.
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.summaries.clear();
        data.short_summaries.clear();
        data.observations.clear();
    }

    pub fn summary_count(&self, table: &str) -> usize {
        self.data.read().summaries.get(table).map_or(0, |t| t.len())
    }

    /// Highest number of data queries observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn check_health(&self) -> FederationResult<()> {
        if !self.data.read().is_healthy {
            return Err(FederationError::unavailable_with_context(
                "Local backend is not healthy",
                ErrorContext::new("check_health").retryable(),
            ));
        }
        Ok(())
    }

    async fn simulate_query(&self) -> FederationResult<InFlight> {
        self.check_health()?;
        let guard = InFlight::enter(self.in_flight.clone(), &self.peak_in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(guard)
    }

    fn matching_summaries(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> Vec<SummaryRow> {
        let data = self.data.read();
        let Some(table) = data.summaries.get(&release.summary_table) else {
            return Vec::new();
        };
        table
            .values()
            .filter(|s| passes_summary_cuts(&release.quality, s))
            .filter(|s| match predicate {
                RegionPredicate::Analytic(p) => p.matches(&s.coord, s.filter, s.fieldid),
                RegionPredicate::Indexed(p) => {
                    let cell = match s.h3index10 {
                        Some(cell) => cell,
                        None => return false,
                    };
                    p.matches(&s.coord, cell, s.filter, s.fieldid)
                }
            })
            .cloned()
            .collect()
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new(BackendKind::Indexed)
    }
}

/// Tracks concurrently running simulated queries.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn passes_summary_cuts(cuts: &QualityCuts, row: &SummaryRow) -> bool {
    !cuts.observed_summaries_only || row.ngoodobs > 0
}

fn passes_observation_cuts(cuts: &QualityCuts, row: &ObservationRow) -> bool {
    (!cuts.clean_flags_only || row.catflags == 0)
        && (!cuts.positive_magerr_only || row.magerr > 0.0)
}

#[async_trait]
impl SpatialBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn health_check(&self) -> FederationResult<()> {
        {
            let mut data = self.data.write();
            if data.failing_probes > 0 {
                data.failing_probes -= 1;
                return Err(FederationError::unavailable_with_context(
                    "Local backend is starting up",
                    ErrorContext::new("health_check").retryable(),
                ));
            }
        }
        self.check_health()
    }

    async fn fetch_summaries(
        &self,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<SummaryRow>> {
        let _query = self.simulate_query().await?;
        let data = self.data.read();
        let Some(table) = data.summaries.get(&release.summary_table) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| table.get(id))
            .filter(|s| passes_summary_cuts(&release.quality, s))
            .cloned()
            .collect())
    }

    async fn fetch_short_summaries(
        &self,
        table: &str,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<ShortSummaryRow>> {
        let _query = self.simulate_query().await?;
        let data = self.data.read();
        let Some(rows) = data.short_summaries.get(table) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id)).cloned().collect())
    }

    async fn fetch_object_observations(
        &self,
        release: &ReleaseDescriptor,
        summary: &SummaryRow,
    ) -> FederationResult<Vec<ObservationRow>> {
        let _query = self.simulate_query().await?;
        let mut rows: Vec<ObservationRow> = {
            let data = self.data.read();
            if data.failing_objects.contains(&summary.oid) {
                return Err(FederationError::query_with_context(
                    format!("observation fetch failed for {}", summary.oid),
                    ErrorContext::new("fetch_object_observations").with_object_id(summary.oid),
                ));
            }
            data.observations
                .get(&release.observation_table)
                .map(|table| {
                    table
                        .iter()
                        .filter(|o| o.row.oid == summary.oid)
                        .filter(|o| summary.h3index10.map_or(true, |cell| cell == o.h3index10))
                        .filter(|o| passes_observation_cuts(&release.quality, &o.row))
                        .map(|o| o.row.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        rows.sort_by(|a, b| a.mjd.total_cmp(&b.mjd));
        Ok(rows)
    }

    async fn fetch_region_observations(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObservationRow>> {
        let _query = self.simulate_query().await?;

        match predicate {
            RegionPredicate::Analytic(_) => {
                // Located through the summary table, like the relational join
                let inside: BTreeSet<ObjectId> = self
                    .matching_summaries(release, predicate)
                    .into_iter()
                    .map(|s| s.oid)
                    .collect();
                let data = self.data.read();
                let mut rows: Vec<ObservationRow> = data
                    .observations
                    .get(&release.observation_table)
                    .into_iter()
                    .flatten()
                    .filter(|o| inside.contains(&o.row.oid))
                    .filter(|o| passes_observation_cuts(&release.quality, &o.row))
                    .map(|o| o.row.clone())
                    .collect();
                rows.sort_by(|a, b| a.oid.cmp(&b.oid).then(a.mjd.total_cmp(&b.mjd)));
                Ok(rows)
            }
            RegionPredicate::Indexed(p) => {
                let data = self.data.read();
                let mut rows: Vec<(u64, ObservationRow)> = data
                    .observations
                    .get(&release.observation_table)
                    .into_iter()
                    .flatten()
                    .filter(|o| {
                        p.matches(
                            &o.placement.position,
                            o.h3index10,
                            o.placement.filter,
                            o.placement.fieldid,
                        )
                    })
                    .filter(|o| passes_observation_cuts(&release.quality, &o.row))
                    .map(|o| (o.h3index10, o.row.clone()))
                    .collect();
                rows.sort_by(|(ca, a), (cb, b)| {
                    ca.cmp(cb)
                        .then(a.oid.cmp(&b.oid))
                        .then(a.mjd.total_cmp(&b.mjd))
                });
                Ok(rows.into_iter().map(|(_, row)| row).collect())
            }
        }
    }

    async fn fetch_region_object_ids(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObjectId>> {
        let _query = self.simulate_query().await?;
        // matching_summaries walks a BTreeMap, so ids come out ascending
        Ok(self
            .matching_summaries(release, predicate)
            .into_iter()
            .map(|s| s.oid)
            .collect())
    }
}
