use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Integer, Text};

use crate::db::codec::PgSphere;
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{ObjectId, ObservationRow, Passband, SummaryRow};

#[derive(Debug, Clone, QueryableByName)]
pub struct SummaryRecord {
    #[diesel(sql_type = BigInt)]
    pub oid: i64,
    #[diesel(sql_type = BigInt)]
    pub nobs: i64,
    #[diesel(sql_type = BigInt)]
    pub ngoodobs: i64,
    #[diesel(sql_type = Double)]
    pub durgood: f64,
    #[diesel(sql_type = Text)]
    pub filter: String,
    #[diesel(sql_type = BigInt)]
    pub fieldid: i64,
    #[diesel(sql_type = BigInt)]
    pub rcid: i64,
    /// pg_sphere `spoint` in its text form
    #[diesel(sql_type = Text)]
    pub coord: String,
}

impl SummaryRecord {
    pub fn into_summary(self) -> FederationResult<SummaryRow> {
        let oid = object_id(self.oid)?;
        let coord = PgSphere::decode_point(&self.coord).map_err(|e| e.with_operation("decode_summary"))?;
        let filter = self.filter.parse::<Passband>().map_err(|_| {
            FederationError::inconsistency_with_context(
                format!("unknown passband label {:?}", self.filter),
                ErrorContext::new("decode_summary").with_object_id(oid),
            )
        })?;
        Ok(SummaryRow {
            oid,
            nobs: self.nobs,
            ngoodobs: self.ngoodobs,
            durgood: self.durgood,
            filter: filter.code(),
            fieldid: self.fieldid,
            rcid: self.rcid,
            coord,
            h3index10: None,
        })
    }
}

#[derive(Debug, Clone, QueryableByName)]
pub struct ObservationRecord {
    #[diesel(sql_type = BigInt)]
    pub oid: i64,
    #[diesel(sql_type = Double)]
    pub mjd: f64,
    #[diesel(sql_type = Double)]
    pub mag: f64,
    #[diesel(sql_type = Double)]
    pub magerr: f64,
    #[diesel(sql_type = Double)]
    pub clrcoeff: f64,
    #[diesel(sql_type = Integer)]
    pub catflags: i32,
}

impl ObservationRecord {
    pub fn into_observation(self) -> FederationResult<ObservationRow> {
        Ok(ObservationRow {
            oid: object_id(self.oid)?,
            mjd: self.mjd,
            mag: self.mag,
            magerr: self.magerr,
            clrcoeff: self.clrcoeff,
            catflags: i64::from(self.catflags),
        })
    }
}

#[derive(Debug, Clone, QueryableByName)]
pub struct IdRecord {
    #[diesel(sql_type = BigInt)]
    pub oid: i64,
}

fn object_id(raw: i64) -> FederationResult<ObjectId> {
    u64::try_from(raw).map(ObjectId).map_err(|_| {
        FederationError::inconsistency_with_context(
            format!("negative object id {} in backend row", raw),
            ErrorContext::new("decode_row"),
        )
    })
}
