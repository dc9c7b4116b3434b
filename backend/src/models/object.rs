//! Object-level records: backend rows and their projected output shapes.
//!
//! `*Row` types are what a backend hands back; [`ObjectSummary`],
//! [`Observation`] and [`ObjectRecord`] are the externally visible
//! projections built per request and discarded after serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::coords::SphericalPoint;
use crate::error::{ErrorContext, FederationError, FederationResult};

/// Stable identifier of one astronomical source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub fn new(value: u64) -> Self {
        ObjectId(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ObjectId).map_err(|_| {
            FederationError::InvalidQueryParameter {
                message: format!("oid value \"{}\" cannot be converted to int", s),
                context: ErrorContext::new("parse_oid"),
            }
        })
    }
}

/// Spectral filter an observation was taken through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Passband {
    Zg,
    Zr,
    Zi,
}

impl Passband {
    pub const ALL: [Passband; 3] = [Passband::Zg, Passband::Zr, Passband::Zi];

    /// Numeric code used by the columnar backend.
    pub fn code(self) -> i64 {
        match self {
            Passband::Zg => 1,
            Passband::Zr => 2,
            Passband::Zi => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Passband::Zg => "zg",
            Passband::Zr => "zr",
            Passband::Zi => "zi",
        }
    }
}

impl fmt::Display for Passband {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Passband {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s.trim())
            .ok_or_else(|| FederationError::InvalidQueryParameter {
                message: format!("unknown passband \"{}\", expected one of zg, zr, zi", s),
                context: ErrorContext::new("parse_passband"),
            })
    }
}

/// One row of a release's summary ("meta") table.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub oid: ObjectId,
    pub nobs: i64,
    pub ngoodobs: i64,
    /// Time span covered by good observations, days
    pub durgood: f64,
    /// Passband code, see [`Passband::code`]
    pub filter: i64,
    pub fieldid: i64,
    pub rcid: i64,
    pub coord: SphericalPoint,
    /// Hex-cell index at resolution 10, present on hex-indexed backends
    pub h3index10: Option<u64>,
}

/// One row of a short-window summary table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortSummaryRow {
    pub oid: ObjectId,
    pub ngoodobs: i64,
    pub durgood: f64,
}

/// One observation as returned by a backend, before projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub oid: ObjectId,
    pub mjd: f64,
    pub mag: f64,
    pub magerr: f64,
    pub clrcoeff: f64,
    /// Quality-flag bitfield
    pub catflags: i64,
}

/// Projected summary of one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSummary {
    pub nobs: i64,
    pub ngoodobs: i64,
    pub duration: f64,
    pub filter: Passband,
    pub fieldid: i64,
    pub rcid: i64,
    pub coord: SphericalPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h3: Option<BTreeMap<u8, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngoodobs_short: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_short: Option<f64>,
}

/// Projected observation. Which fields are present depends on the schema
/// version of the release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub mjd: f64,
    pub mag: f64,
    pub magerr: f64,
    pub clrcoeff: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catflags: Option<i64>,
}

/// One object as returned to clients: summary plus time-ordered light curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    pub meta: ObjectSummary,
    pub lc: Vec<Observation>,
}

/// Response mapping keyed by object identifier.
pub type LightCurves = BTreeMap<ObjectId, ObjectRecord>;

/// Parse raw identifier strings, rejecting empty input.
///
/// Duplicates collapse; the result is sorted.
pub fn parse_object_ids<S: AsRef<str>>(raw: &[S]) -> FederationResult<Vec<ObjectId>> {
    if raw.is_empty() {
        return Err(FederationError::InvalidQueryParameter {
            message: "Query string should have at least one \"oid\" field".to_string(),
            context: ErrorContext::new("parse_oids"),
        });
    }
    let mut ids = raw
        .iter()
        .map(|s| s.as_ref().parse::<ObjectId>())
        .collect::<FederationResult<Vec<_>>>()?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passband_codes() {
        assert_eq!(Passband::from_code(1), Some(Passband::Zg));
        assert_eq!(Passband::from_code(2), Some(Passband::Zr));
        assert_eq!(Passband::from_code(3), Some(Passband::Zi));
        assert_eq!(Passband::from_code(0), None);
        assert_eq!(Passband::from_code(4), None);
    }

    #[test]
    fn test_passband_names() {
        assert_eq!("zr".parse::<Passband>().unwrap(), Passband::Zr);
        assert!("r".parse::<Passband>().is_err());
        assert_eq!(Passband::Zi.to_string(), "zi");
    }

    #[test]
    fn test_parse_object_ids() {
        let ids = parse_object_ids(&["830202400008402", "5", "5"]).unwrap();
        assert_eq!(ids, vec![ObjectId(5), ObjectId(830202400008402)]);
    }

    #[test]
    fn test_parse_object_ids_rejects_garbage() {
        let err = parse_object_ids(&["12", "abc"]).unwrap_err();
        assert!(err.is_client_error());
        assert!(parse_object_ids(&["-1"]).is_err());
        assert!(parse_object_ids::<&str>(&[]).is_err());
    }

    #[test]
    fn test_object_id_as_json_key() {
        let mut map = BTreeMap::new();
        map.insert(ObjectId(42), 1);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"42":1}"#);
    }

    #[test]
    fn test_observation_omits_catflags_when_absent() {
        let obs = Observation {
            mjd: 58200.1,
            mag: 18.0,
            magerr: 0.05,
            clrcoeff: 0.1,
            catflags: None,
        };
        let json = serde_json::to_value(&obs).unwrap();
        assert!(json.get("catflags").is_none());
        assert_eq!(json["mjd"], 58200.1);
    }
}
