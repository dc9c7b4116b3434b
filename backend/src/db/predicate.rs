//! Spatial predicate builder.
//!
//! Turns a validated [`RegionQuery`] into the filter a backend family
//! understands:
//!
//! - **Analytic** (pg_sphere): one exact containment clause over the stored
//!   point column, followed by the optional column constraints. Clauses and
//!   bound parameters are emitted in a fixed order so `$n` placeholders line
//!   up with the parameter list.
//! - **Indexed** (hex grid): a coarse candidate-cell set covering the circle,
//!   refined by an exact great-circle distance test in the same query.
//!
//! Both predicates can also be evaluated in memory, which is what the local
//! backend does.

use h3o::{LatLng, Resolution};

use crate::db::codec::PgSphere;
use crate::db::releases::BackendKind;
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{Passband, RegionQuery, SphericalPoint};

/// Hex-grid resolution the indexed backend buckets rows at.
pub const H3_RESOLUTION: Resolution = Resolution::Ten;

/// A bound parameter of an analytic predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    IntArray(Vec<i32>),
}

/// Hex cell containing `point` at [`H3_RESOLUTION`].
pub fn cell_index(point: &SphericalPoint) -> FederationResult<u64> {
    let latlng = LatLng::new(point.dec, point.ra).map_err(|e| {
        FederationError::InvalidQueryParameter {
            message: format!("cannot index ({}, {}): {}", point.ra, point.dec, e),
            context: ErrorContext::new("cell_index"),
        }
    })?;
    Ok(u64::from(latlng.to_cell(H3_RESOLUTION)))
}

/// Number of cell rings needed to cover `radius_rad` around a center cell.
///
/// The extra ring absorbs cells lost to grid quantization at the boundary.
pub fn ring_size(radius_rad: f64) -> u32 {
    (radius_rad / H3_RESOLUTION.edge_length_rads()).ceil() as u32 + 1
}

/// Exact containment predicate for the point/circle native backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticPredicate {
    query: RegionQuery,
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl AnalyticPredicate {
    pub fn build(query: &RegionQuery) -> Self {
        let circle = PgSphere::encode_circle(&query.circle);
        let names = |bands: &[Passband]| bands.iter().map(|p| p.name().to_string()).collect();

        // circle, include-filter, exclude-filter, include-field, exclude-field
        let candidates = [
            (true, "coord @ ${i}::scircle", SqlParam::Text(circle)),
            (
                !query.passbands.include.is_empty(),
                "filter = ANY(${i}::FILTER[])",
                SqlParam::TextArray(names(&query.passbands.include)),
            ),
            (
                !query.passbands.exclude.is_empty(),
                "NOT filter = ANY(${i}::FILTER[])",
                SqlParam::TextArray(names(&query.passbands.exclude)),
            ),
            (
                !query.fields.include.is_empty(),
                "fieldid = ANY(${i}::int[])",
                SqlParam::IntArray(query.fields.include.clone()),
            ),
            (
                !query.fields.exclude.is_empty(),
                "NOT fieldid = ANY(${i}::int[])",
                SqlParam::IntArray(query.fields.exclude.clone()),
            ),
        ];

        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for (present, template, param) in candidates {
            if present {
                params.push(param);
                clauses.push(template.replace("{i}", &params.len().to_string()));
            }
        }

        Self {
            query: query.clone(),
            clauses,
            params,
        }
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    /// Parameters in placeholder order (`$1` first).
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn where_clause(&self) -> String {
        self.clauses.join(" AND ")
    }

    pub fn matches(&self, coord: &SphericalPoint, filter: i64, fieldid: i64) -> bool {
        self.query.circle.contains(coord) && accepts_columns(&self.query, filter, fieldid)
    }
}

/// Coarse-cell-then-refine predicate for the hex-indexed backend.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPredicate {
    query: RegionQuery,
    center_cell: u64,
    ring: u32,
    /// Sorted, deduplicated
    candidate_cells: Vec<u64>,
}

impl IndexedPredicate {
    pub fn build(query: &RegionQuery) -> FederationResult<Self> {
        let center = &query.circle.center;
        let latlng = LatLng::new(center.dec, center.ra).map_err(|e| {
            FederationError::InvalidQueryParameter {
                message: format!("cannot index circle center: {}", e),
                context: ErrorContext::new("build_indexed_predicate"),
            }
        })?;
        let cell = latlng.to_cell(H3_RESOLUTION);
        let ring = ring_size(query.circle.radius_rad());

        let mut candidate_cells: Vec<u64> = cell
            .grid_disk::<Vec<_>>(ring)
            .into_iter()
            .map(u64::from)
            .collect();
        candidate_cells.sort_unstable();
        candidate_cells.dedup();

        Ok(Self {
            query: query.clone(),
            center_cell: u64::from(cell),
            ring,
            candidate_cells,
        })
    }

    pub fn center_cell(&self) -> u64 {
        self.center_cell
    }

    pub fn ring(&self) -> u32 {
        self.ring
    }

    pub fn candidate_cells(&self) -> &[u64] {
        &self.candidate_cells
    }

    /// Render the filter for the columnar backend. Both halves are required:
    /// the cell list lets the index prune, the distance test makes it exact.
    pub fn to_sql(&self) -> String {
        let circle = &self.query.circle;
        let cells = join(self.candidate_cells.iter());
        let mut sql = format!(
            "h3index10 IN ({}) AND greatCircleAngle({}, {}, ra, dec) < {}",
            cells,
            circle.center.ra,
            circle.center.dec,
            circle.radius_deg()
        );

        let codes = |bands: &[Passband]| join(bands.iter().map(|p| p.code()));
        let passbands = &self.query.passbands;
        if !passbands.include.is_empty() {
            sql.push_str(&format!(" AND filter IN ({})", codes(&passbands.include)));
        }
        if !passbands.exclude.is_empty() {
            sql.push_str(&format!(" AND filter NOT IN ({})", codes(&passbands.exclude)));
        }
        let fields = &self.query.fields;
        if !fields.include.is_empty() {
            sql.push_str(&format!(" AND fieldid IN ({})", join(fields.include.iter())));
        }
        if !fields.exclude.is_empty() {
            sql.push_str(&format!(" AND fieldid NOT IN ({})", join(fields.exclude.iter())));
        }
        sql
    }

    pub fn coarse_matches(&self, cell: u64) -> bool {
        self.candidate_cells.binary_search(&cell).is_ok()
    }

    pub fn refine_matches(&self, position: &SphericalPoint) -> bool {
        self.query.circle.contains(position)
    }

    pub fn matches(&self, position: &SphericalPoint, cell: u64, filter: i64, fieldid: i64) -> bool {
        self.coarse_matches(cell)
            && self.refine_matches(position)
            && accepts_columns(&self.query, filter, fieldid)
    }
}

/// Backend-specific region filter.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionPredicate {
    Analytic(AnalyticPredicate),
    Indexed(IndexedPredicate),
}

impl RegionPredicate {
    pub fn build(kind: BackendKind, query: &RegionQuery) -> FederationResult<Self> {
        match kind {
            BackendKind::Analytic => Ok(Self::Analytic(AnalyticPredicate::build(query))),
            BackendKind::Indexed => IndexedPredicate::build(query).map(Self::Indexed),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Analytic(_) => BackendKind::Analytic,
            Self::Indexed(_) => BackendKind::Indexed,
        }
    }

    pub fn query(&self) -> &RegionQuery {
        match self {
            Self::Analytic(p) => &p.query,
            Self::Indexed(p) => &p.query,
        }
    }

    /// Output ordering of region observations. Identifiers must come out in
    /// contiguous runs for the join step.
    pub fn ordering(&self) -> &'static str {
        match self {
            Self::Analytic(_) => "oid, mjd",
            Self::Indexed(_) => "h3index10, oid, mjd",
        }
    }
}

fn accepts_columns(query: &RegionQuery, filter: i64, fieldid: i64) -> bool {
    let band_ok = match Passband::from_code(filter) {
        Some(band) => query.passbands.accepts(&band),
        None => query.passbands.include.is_empty(),
    };
    let field_ok = i32::try_from(fieldid)
        .map(|f| query.fields.accepts(&f))
        .unwrap_or(query.fields.include.is_empty());
    band_ok && field_ok
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}
