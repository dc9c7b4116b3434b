//! Request and response shapes for the HTTP API.
//!
//! Light-curve responses serialize [`crate::models::LightCurves`] directly;
//! only the auxiliary endpoints need their own types here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::RawRegionParams;

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when every attached backend answers, `degraded` otherwise
    pub status: String,
    pub version: String,
    /// Per backend family: `connected` or the probe error
    pub backends: BTreeMap<String, String>,
}

/// Query string as ordered key/value pairs.
///
/// Several parameters (`oid`, `filter`, `fieldid`, ...) may be repeated, so
/// the string is kept as a list instead of a struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct QueryPairs(pub Vec<(String, String)>);

impl QueryPairs {
    /// Every value given for `key`, in request order.
    pub fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// The first value given for `key`.
    pub fn first(&self, key: &str) -> Option<String> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub fn object_ids(&self) -> Vec<String> {
        self.all("oid")
    }

    pub fn region(&self) -> RawRegionParams {
        RawRegionParams {
            ra: self.first("ra"),
            dec: self.first("dec"),
            radius_arcsec: self.first("radius_arcsec"),
            filter: self.all("filter"),
            not_filter: self.all("not_filter"),
            fieldid: self.all("fieldid"),
            not_fieldid: self.all("not_fieldid"),
        }
    }
}
