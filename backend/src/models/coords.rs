//! Sky positions and cone-search circles.
//!
//! Positions are held canonically in decimal degrees. Conversions to the
//! radian encoding used on the wire go through [`DEG_TO_RAD`] and
//! [`RAD_TO_DEG`] only, so encode/decode stays an exact inverse up to
//! floating-point rounding.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorContext, FederationError, FederationResult};

/// Largest accepted cone-search radius, in arcseconds.
pub const MAX_RADIUS_ARCSEC: f64 = 60.0;

/// Degrees to radians (π/180).
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Radians to degrees (180/π).
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

pub const ARCSEC_PER_DEGREE: f64 = 3600.0;

/// A position on the unit sphere, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphericalPoint {
    /// Right ascension, degrees in `[0, 360)`
    pub ra: f64,
    /// Declination, degrees in `[-90, 90]`
    pub dec: f64,
}

impl SphericalPoint {
    /// Validate and build a point from user-supplied degrees.
    ///
    /// Right ascension is wrapped into `[0, 360)`; declination outside
    /// `[-90, 90]` is rejected.
    pub fn new(ra: f64, dec: f64) -> FederationResult<Self> {
        if !ra.is_finite() || !dec.is_finite() {
            return Err(FederationError::InvalidQueryParameter {
                message: format!("ra and dec should be finite, got ra={} dec={}", ra, dec),
                context: ErrorContext::new("validate_point"),
            });
        }
        if !(-90.0..=90.0).contains(&dec) {
            return Err(FederationError::InvalidQueryParameter {
                message: format!("dec should be within [-90, 90], got {}", dec),
                context: ErrorContext::new("validate_point"),
            });
        }
        // rem_euclid rounds tiny negatives up to exactly 360
        let ra = ra.rem_euclid(360.0);
        Ok(Self {
            ra: if ra >= 360.0 { 0.0 } else { ra },
            dec,
        })
    }

    /// Build a point from a radian pair as stored by the backend.
    pub fn from_radians(ra_rad: f64, dec_rad: f64) -> Self {
        Self {
            ra: ra_rad * RAD_TO_DEG,
            dec: dec_rad * RAD_TO_DEG,
        }
    }

    pub fn ra_rad(&self) -> f64 {
        self.ra * DEG_TO_RAD
    }

    pub fn dec_rad(&self) -> f64 {
        self.dec * DEG_TO_RAD
    }

    /// Great-circle distance to `other`, in radians.
    ///
    /// Uses the Vincenty formula, which stays accurate at the arcsecond
    /// separations cone searches work with.
    pub fn angular_distance(&self, other: &SphericalPoint) -> f64 {
        let (sin_lat1, cos_lat1) = self.dec_rad().sin_cos();
        let (sin_lat2, cos_lat2) = other.dec_rad().sin_cos();
        let (sin_dlon, cos_dlon) = (other.ra_rad() - self.ra_rad()).sin_cos();

        let num = ((cos_lat2 * sin_dlon).powi(2)
            + (cos_lat1 * sin_lat2 - sin_lat1 * cos_lat2 * cos_dlon).powi(2))
        .sqrt();
        let den = sin_lat1 * sin_lat2 + cos_lat1 * cos_lat2 * cos_dlon;

        num.atan2(den)
    }

    /// Great-circle distance to `other`, in degrees.
    pub fn angular_distance_deg(&self, other: &SphericalPoint) -> f64 {
        self.angular_distance(other) * RAD_TO_DEG
    }
}

/// A cone-search region: center plus angular radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphericalCircle {
    pub center: SphericalPoint,
    /// Radius in arcseconds
    pub radius_arcsec: f64,
}

impl SphericalCircle {
    /// Build a circle, enforcing `0 < radius_arcsec <= MAX_RADIUS_ARCSEC`.
    pub fn new(center: SphericalPoint, radius_arcsec: f64) -> FederationResult<Self> {
        if !radius_arcsec.is_finite() || radius_arcsec <= 0.0 || radius_arcsec > MAX_RADIUS_ARCSEC
        {
            return Err(FederationError::InvalidQueryParameter {
                message: format!(
                    "\"radius\" should be positive and not greater than {}, got {}",
                    MAX_RADIUS_ARCSEC, radius_arcsec
                ),
                context: ErrorContext::new("validate_radius"),
            });
        }
        Ok(Self {
            center,
            radius_arcsec,
        })
    }

    pub fn radius_deg(&self) -> f64 {
        self.radius_arcsec / ARCSEC_PER_DEGREE
    }

    pub fn radius_rad(&self) -> f64 {
        self.radius_deg() * DEG_TO_RAD
    }

    /// Strict containment: distance to the center is below the radius.
    pub fn contains(&self, point: &SphericalPoint) -> bool {
        self.center.angular_distance(point) < self.radius_rad()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_normalizes_ra() {
        let p = SphericalPoint::new(-10.0, 5.0).unwrap();
        assert!((p.ra - 350.0).abs() < 1e-12);
        let p = SphericalPoint::new(370.0, 5.0).unwrap();
        assert!((p.ra - 10.0).abs() < 1e-12);
        let p = SphericalPoint::new(-1e-20, 0.0).unwrap();
        assert!((0.0..360.0).contains(&p.ra));
        assert_eq!(SphericalPoint::new(360.0, 0.0).unwrap().ra, 0.0);
    }

    #[test]
    fn test_point_rejects_bad_dec() {
        assert!(SphericalPoint::new(10.0, 90.5).is_err());
        assert!(SphericalPoint::new(10.0, f64::NAN).is_err());
        assert!(SphericalPoint::new(10.0, -90.0).is_ok());
    }

    #[test]
    fn test_distance_same_point() {
        let p = SphericalPoint::new(123.4, -56.7).unwrap();
        assert!(p.angular_distance(&p).abs() < 1e-15);
    }

    #[test]
    fn test_distance_along_meridian() {
        let a = SphericalPoint::new(10.0, 30.0).unwrap();
        let b = SphericalPoint::new(10.0, 30.0 + 10.0 / 3600.0).unwrap();
        let arcsec = a.angular_distance_deg(&b) * ARCSEC_PER_DEGREE;
        assert!((arcsec - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_across_ra_wrap() {
        let a = SphericalPoint::new(359.999, 0.0).unwrap();
        let b = SphericalPoint::new(0.001, 0.0).unwrap();
        assert!((a.angular_distance_deg(&b) - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_radius_bounds() {
        let c = SphericalPoint::new(10.0, 30.0).unwrap();
        assert!(SphericalCircle::new(c, 0.0).is_err());
        assert!(SphericalCircle::new(c, -1.0).is_err());
        assert!(SphericalCircle::new(c, 60.000001).is_err());
        assert!(SphericalCircle::new(c, f64::INFINITY).is_err());
        assert!(SphericalCircle::new(c, 60.0).is_ok());
        assert!(SphericalCircle::new(c, 0.001).is_ok());
    }

    #[test]
    fn test_circle_contains_is_strict() {
        let center = SphericalPoint::new(10.0, 0.0).unwrap();
        let circle = SphericalCircle::new(center, 36.0).unwrap();
        let inside = SphericalPoint::new(10.0, 0.009).unwrap();
        let outside = SphericalPoint::new(10.0, 0.011).unwrap();
        assert!(circle.contains(&inside));
        assert!(!circle.contains(&outside));
    }
}
