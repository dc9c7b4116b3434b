//! Row-to-output projection.
//!
//! Observation fields are whitelisted by schema version; summaries are
//! renamed into the public shape (`durgood` becomes `duration`, passband
//! codes become names, the cell index moves under `h3`).

use std::collections::BTreeMap;

use crate::db::releases::{ObservationField, SchemaVersion};
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{ObjectSummary, Observation, ObservationRow, Passband, ShortSummaryRow, SummaryRow};

/// Resolution the `h3` map is keyed by.
const H3_KEY: u8 = 10;

pub fn project_observation(schema: SchemaVersion, row: &ObservationRow) -> Observation {
    Observation {
        mjd: row.mjd,
        mag: row.mag,
        magerr: row.magerr,
        clrcoeff: row.clrcoeff,
        catflags: schema
            .exposes(ObservationField::CatFlags)
            .then_some(row.catflags),
    }
}

/// Project a summary row, merging short-window statistics when given.
///
/// An unknown passband code is a backend fault, not a client one.
pub fn project_summary(
    row: &SummaryRow,
    short: Option<&ShortSummaryRow>,
) -> FederationResult<ObjectSummary> {
    let filter = Passband::from_code(row.filter).ok_or_else(|| {
        FederationError::inconsistency_with_context(
            format!("unknown passband code {}", row.filter),
            ErrorContext::new("project_summary").with_object_id(row.oid),
        )
    })?;

    Ok(ObjectSummary {
        nobs: row.nobs,
        ngoodobs: row.ngoodobs,
        duration: row.durgood,
        filter,
        fieldid: row.fieldid,
        rcid: row.rcid,
        coord: row.coord,
        h3: row.h3index10.map(|cell| BTreeMap::from([(H3_KEY, cell)])),
        ngoodobs_short: short.map(|s| s.ngoodobs),
        duration_short: short.map(|s| s.durgood),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectId, SphericalPoint};

    fn row() -> SummaryRow {
        SummaryRow {
            oid: ObjectId(7),
            nobs: 10,
            ngoodobs: 8,
            durgood: 120.5,
            filter: 3,
            fieldid: 600,
            rcid: 4,
            coord: SphericalPoint::new(10.0, 30.0).unwrap(),
            h3index10: Some(12345),
        }
    }

    #[test]
    fn test_summary_renames() {
        let summary = project_summary(&row(), None).unwrap();
        assert_eq!(summary.duration, 120.5);
        assert_eq!(summary.filter, Passband::Zi);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["filter"], "zi");
        assert_eq!(json["h3"]["10"], 12345);
        assert_eq!(json["coord"]["ra"], 10.0);
        assert!(json.get("durgood").is_none());
        assert!(json.get("ngoodobs_short").is_none());
        assert!(json.get("duration_short").is_none());
    }

    #[test]
    fn test_short_window_merge() {
        let short = ShortSummaryRow {
            oid: ObjectId(7),
            ngoodobs: 2,
            durgood: 3.5,
        };
        let summary = project_summary(&row(), Some(&short)).unwrap();
        assert_eq!(summary.ngoodobs_short, Some(2));
        assert_eq!(summary.duration_short, Some(3.5));
    }

    #[test]
    fn test_unknown_passband_is_server_fault() {
        let mut bad = row();
        bad.filter = 9;
        let err = project_summary(&bad, None).unwrap_err();
        assert!(matches!(err, FederationError::InternalInconsistency { .. }));
    }

    #[test]
    fn test_observation_whitelist() {
        let obs = ObservationRow {
            oid: ObjectId(7),
            mjd: 58200.1,
            mag: 18.0,
            magerr: 0.1,
            clrcoeff: -0.02,
            catflags: 0,
        };
        assert_eq!(project_observation(SchemaVersion::V2, &obs).catflags, Some(0));
        assert_eq!(project_observation(SchemaVersion::V3, &obs).catflags, None);
    }
}
