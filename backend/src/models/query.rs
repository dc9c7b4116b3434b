//! Validated region-query input.

use super::coords::{SphericalCircle, SphericalPoint};
use super::object::Passband;
use crate::error::{ErrorContext, FederationError, FederationResult};

/// Inclusion / exclusion lists for one column. Empty lists mean "no constraint".
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<T> {
    pub include: Vec<T>,
    pub exclude: Vec<T>,
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl<T: PartialEq> Selection<T> {
    pub fn is_unconstrained(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn accepts(&self, value: &T) -> bool {
        (self.include.is_empty() || self.include.contains(value)) && !self.exclude.contains(value)
    }
}

/// A cone search with optional passband and field constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionQuery {
    pub circle: SphericalCircle,
    pub passbands: Selection<Passband>,
    pub fields: Selection<i32>,
}

/// Raw, unparsed region parameters as they arrive from a request.
#[derive(Debug, Clone, Default)]
pub struct RawRegionParams {
    pub ra: Option<String>,
    pub dec: Option<String>,
    pub radius_arcsec: Option<String>,
    pub filter: Vec<String>,
    pub not_filter: Vec<String>,
    pub fieldid: Vec<String>,
    pub not_fieldid: Vec<String>,
}

impl RegionQuery {
    /// A plain cone search without column constraints.
    pub fn cone(ra: f64, dec: f64, radius_arcsec: f64) -> FederationResult<Self> {
        let center = SphericalPoint::new(ra, dec)?;
        Ok(Self {
            circle: SphericalCircle::new(center, radius_arcsec)?,
            passbands: Selection::default(),
            fields: Selection::default(),
        })
    }

    /// Parse and validate raw request parameters.
    ///
    /// Every failure is an `InvalidQueryParameter`; nothing here touches a backend.
    pub fn parse(raw: &RawRegionParams) -> FederationResult<Self> {
        let (ra, dec, radius) = match (&raw.ra, &raw.dec, &raw.radius_arcsec) {
            (Some(ra), Some(dec), Some(radius)) => (ra, dec, radius),
            _ => {
                return Err(invalid(
                    "All of \"ra\", \"dec\" and \"radius_arcsec\" fields should be specified",
                ))
            }
        };
        let ra = parse_float(ra)?;
        let dec = parse_float(dec)?;
        let radius = parse_float(radius)?;

        let mut query = Self::cone(ra, dec, radius)?;
        query.passbands = Selection {
            include: parse_all(&raw.filter)?,
            exclude: parse_all(&raw.not_filter)?,
        };
        query.fields = Selection {
            include: parse_field_ids(&raw.fieldid)?,
            exclude: parse_field_ids(&raw.not_fieldid)?,
        };
        Ok(query)
    }
}

fn invalid(message: impl Into<String>) -> FederationError {
    FederationError::InvalidQueryParameter {
        message: message.into(),
        context: ErrorContext::new("parse_region"),
    }
}

fn parse_float(value: &str) -> FederationResult<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        invalid("All of \"ra\", \"dec\" and \"radius_arcsec\" fields should be floats")
    })
}

fn parse_all(values: &[String]) -> FederationResult<Vec<Passband>> {
    values.iter().map(|v| v.parse()).collect()
}

fn parse_field_ids(values: &[String]) -> FederationResult<Vec<i32>> {
    values
        .iter()
        .map(|v| {
            v.trim()
                .parse::<i32>()
                .map_err(|_| invalid("All \"fieldid\" and \"not_fieldid\" values should be int"))
        })
        .collect()
}
