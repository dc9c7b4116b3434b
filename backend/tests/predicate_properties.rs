//! Property tests: both predicate families select the same points as a
//! reference great-circle distance.

use proptest::prelude::*;

use ztf_lc::db::predicate::{cell_index, AnalyticPredicate, IndexedPredicate};
use ztf_lc::models::{RegionQuery, SphericalPoint, ARCSEC_PER_DEGREE, DEG_TO_RAD};

/// Haversine distance in radians, independent of the crate's formula.
fn reference_distance(a: &SphericalPoint, b: &SphericalPoint) -> f64 {
    let (lat1, lat2) = (a.dec * DEG_TO_RAD, b.dec * DEG_TO_RAD);
    let dlat = lat2 - lat1;
    let dlon = (b.ra - a.ra) * DEG_TO_RAD;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

/// Points scattered around (`ra`, `dec`) up to twice the radius away.
fn scatter(ra: f64, dec: f64, radius_arcsec: f64, offsets: &[(f64, f64)]) -> Vec<SphericalPoint> {
    let reach = 2.0 * radius_arcsec / ARCSEC_PER_DEGREE;
    offsets
        .iter()
        .filter_map(|(u, v)| {
            let d_dec = v * reach;
            let d_ra = u * reach / (dec * DEG_TO_RAD).cos();
            SphericalPoint::new(ra + d_ra, dec + d_dec).ok()
        })
        .collect()
}

fn region_strategy() -> impl Strategy<Value = (f64, f64, f64, Vec<(f64, f64)>)> {
    (
        0.0f64..360.0,
        -80.0f64..80.0,
        0.5f64..=60.0,
        prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0), 1..64),
    )
}

/// Points this close to the rim are left out; two distance formulas may
/// round differently there.
const RIM_TOLERANCE_RAD: f64 = 1e-12;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn analytic_selects_points_closer_than_radius(
        (ra, dec, radius, offsets) in region_strategy()
    ) {
        let query = RegionQuery::cone(ra, dec, radius).unwrap();
        let predicate = AnalyticPredicate::build(&query);
        let center = query.circle.center;
        let radius_rad = query.circle.radius_rad();

        for point in scatter(ra, dec, radius, &offsets) {
            let distance = reference_distance(&center, &point);
            if (distance - radius_rad).abs() <= RIM_TOLERANCE_RAD {
                continue;
            }
            prop_assert_eq!(predicate.matches(&point, 1, 600), distance < radius_rad);
        }
    }

    #[test]
    fn coarse_cells_cover_every_refined_point(
        (ra, dec, radius, offsets) in region_strategy()
    ) {
        let query = RegionQuery::cone(ra, dec, radius).unwrap();
        let predicate = IndexedPredicate::build(&query).unwrap();

        for point in scatter(ra, dec, radius, &offsets) {
            if predicate.refine_matches(&point) {
                let cell = cell_index(&point).unwrap();
                prop_assert!(predicate.coarse_matches(cell));
            }
        }
    }

    #[test]
    fn indexed_and_analytic_agree(
        (ra, dec, radius, offsets) in region_strategy()
    ) {
        let query = RegionQuery::cone(ra, dec, radius).unwrap();
        let analytic = AnalyticPredicate::build(&query);
        let indexed = IndexedPredicate::build(&query).unwrap();

        for point in scatter(ra, dec, radius, &offsets) {
            let cell = cell_index(&point).unwrap();
            prop_assert_eq!(
                indexed.matches(&point, cell, 2, 700),
                analytic.matches(&point, 2, 700)
            );
        }
    }
}
