//! Wire codec for pg_sphere point and circle columns.
//!
//! pg_sphere speaks radians in a bracketed text form:
//!
//! ```text
//! spoint   (ra_rad, dec_rad)
//! scircle  <(ra_rad, dec_rad), radius_rad>
//! ```
//!
//! The codec is invoked directly by the predicate builder (encode) and the
//! postgres gateway (decode); nothing is registered with the driver.

use crate::error::{FederationError, FederationResult};
use crate::models::{SphericalCircle, SphericalPoint, ARCSEC_PER_DEGREE, RAD_TO_DEG};

/// A bidirectional text encoding for one spherical-geometry type.
pub trait WireCodec<T> {
    fn encode(value: &T) -> String;
    fn decode(wire: &str) -> FederationResult<T>;
}

/// The pg_sphere text representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgSphere;

impl PgSphere {
    pub fn encode_point(point: &SphericalPoint) -> String {
        <Self as WireCodec<SphericalPoint>>::encode(point)
    }

    pub fn decode_point(wire: &str) -> FederationResult<SphericalPoint> {
        <Self as WireCodec<SphericalPoint>>::decode(wire)
    }

    pub fn encode_circle(circle: &SphericalCircle) -> String {
        <Self as WireCodec<SphericalCircle>>::encode(circle)
    }

    pub fn decode_circle(wire: &str) -> FederationResult<SphericalCircle> {
        <Self as WireCodec<SphericalCircle>>::decode(wire)
    }
}

impl WireCodec<SphericalPoint> for PgSphere {
    fn encode(point: &SphericalPoint) -> String {
        format!("({}, {})", point.ra_rad(), point.dec_rad())
    }

    fn decode(wire: &str) -> FederationResult<SphericalPoint> {
        let inner = strip_brackets(wire, '(', ')')?;
        let mut parts = inner.split(',');
        let (ra, dec) = match (parts.next(), parts.next(), parts.next()) {
            (Some(ra), Some(dec), None) => (ra, dec),
            _ => {
                return Err(FederationError::malformed_coordinate(format!(
                    "expected \"(ra, dec)\", got {:?}",
                    wire
                )))
            }
        };
        let point = SphericalPoint::from_radians(parse_number(ra, wire)?, parse_number(dec, wire)?);
        if point.dec.abs() > 90.0 + POLE_TOLERANCE_DEG {
            return Err(FederationError::malformed_coordinate(format!(
                "declination {} out of range in {:?}",
                point.dec, wire
            )));
        }
        Ok(SphericalPoint {
            dec: point.dec.clamp(-90.0, 90.0),
            ..point
        })
    }
}

impl WireCodec<SphericalCircle> for PgSphere {
    fn encode(circle: &SphericalCircle) -> String {
        format!(
            "<{}, {}>",
            PgSphere::encode_point(&circle.center),
            circle.radius_rad()
        )
    }

    fn decode(wire: &str) -> FederationResult<SphericalCircle> {
        let inner = strip_brackets(wire, '<', '>')?;
        let (point, radius) = inner.rsplit_once(',').ok_or_else(|| {
            FederationError::malformed_coordinate(format!(
                "expected \"<point, radius>\", got {:?}",
                wire
            ))
        })?;
        let center = PgSphere::decode_point(point)?;
        let radius_rad = parse_number(radius, wire)?;
        Ok(SphericalCircle {
            center,
            radius_arcsec: radius_rad * RAD_TO_DEG * ARCSEC_PER_DEGREE,
        })
    }
}

fn strip_brackets(wire: &str, open: char, close: char) -> FederationResult<&str> {
    wire.trim()
        .strip_prefix(open)
        .and_then(|s| s.strip_suffix(close))
        .ok_or_else(|| {
            FederationError::malformed_coordinate(format!(
                "expected {:?} ... {:?} brackets, got {:?}",
                open, close, wire
            ))
        })
}

/// Slack for the degree/radian round trip at the poles.
const POLE_TOLERANCE_DEG: f64 = 1e-9;

fn parse_number(part: &str, wire: &str) -> FederationResult<f64> {
    let value = part.trim().parse::<f64>().map_err(|_| {
        FederationError::malformed_coordinate(format!("{:?} is not a number in {:?}", part, wire))
    })?;
    if !value.is_finite() {
        return Err(FederationError::malformed_coordinate(format!(
            "non-finite component in {:?}",
            wire
        )));
    }
    Ok(value)
}
