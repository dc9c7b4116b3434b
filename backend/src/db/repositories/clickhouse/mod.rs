//! ClickHouse backend over the HTTP interface.
//!
//! Serves the hex-indexed backend family. Queries are posted as plain SQL
//! with `FORMAT JSONEachRow` and decoded line by line with serde. A
//! semaphore bounds the number of queries in flight.
//!
//! ## Configuration
//!
//! Built by [`crate::config::ServiceConfig::clickhouse_config`] from the
//! `[clickhouse]` section, with these environment overrides:
//! - `CLICKHOUSE_URL`: HTTP endpoint (default: `http://localhost:8123`)
//! - `CLICKHOUSE_DATABASE`: Database name (default: `ztf`)
//! - `CLICKHOUSE_USER`: User name (default: `default`)
//! - `CLICKHOUSE_PASSWORD`: Password (default: empty)
//! - `CLICKHOUSE_MAX_CONNECTIONS`: In-flight query limit (default: 10)
//! - `CLICKHOUSE_TIMEOUT_SEC`: Per-query HTTP timeout (default: 60)

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::db::predicate::RegionPredicate;
use crate::db::releases::{BackendKind, ReleaseDescriptor};
use crate::db::repository::SpatialBackend;
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{ObjectId, ObservationRow, ShortSummaryRow, SphericalPoint, SummaryRow};

const OBSERVATION_COLUMNS: &str = "oid, mjd, mag, magerr, clrcoeff, catflags";
const SUMMARY_COLUMNS: &str = "oid, nobs, ngoodobs, durgood, filter, fieldid, rcid, ra, dec, h3index10";

/// Configuration for the ClickHouse HTTP interface.
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Maximum number of queries in flight
    pub max_connections: usize,
    pub timeout_sec: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "ztf".to_string(),
            user: "default".to_string(),
            password: String::new(),
            max_connections: 10,
            timeout_sec: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryRecord {
    oid: u64,
    nobs: i64,
    ngoodobs: i64,
    durgood: f64,
    filter: i64,
    fieldid: i64,
    rcid: i64,
    ra: f64,
    dec: f64,
    h3index10: u64,
}

impl SummaryRecord {
    fn into_summary(self) -> FederationResult<SummaryRow> {
        let coord = SphericalPoint::new(self.ra, self.dec).map_err(|e| {
            FederationError::malformed_coordinate(e.to_string()).with_operation("decode_summary")
        })?;
        Ok(SummaryRow {
            oid: ObjectId(self.oid),
            nobs: self.nobs,
            ngoodobs: self.ngoodobs,
            durgood: self.durgood,
            filter: self.filter,
            fieldid: self.fieldid,
            rcid: self.rcid,
            coord,
            h3index10: Some(self.h3index10),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ShortSummaryRecord {
    oid: u64,
    ngoodobs: i64,
    durgood: f64,
}

#[derive(Debug, Deserialize)]
struct ObservationRecord {
    oid: u64,
    mjd: f64,
    mag: f64,
    magerr: f64,
    clrcoeff: f64,
    catflags: i64,
}

impl From<ObservationRecord> for ObservationRow {
    fn from(r: ObservationRecord) -> Self {
        ObservationRow {
            oid: ObjectId(r.oid),
            mjd: r.mjd,
            mag: r.mag,
            magerr: r.magerr,
            clrcoeff: r.clrcoeff,
            catflags: r.catflags,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdRecord {
    oid: u64,
}

/// reqwest-backed gateway for the hex-indexed tables.
#[derive(Clone, Debug)]
pub struct ClickHouseBackend {
    client: reqwest::Client,
    config: ClickHouseConfig,
    permits: Arc<Semaphore>,
}

impl ClickHouseBackend {
    pub fn new(config: ClickHouseConfig) -> FederationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .map_err(|e| {
                FederationError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));

        log::info!(
            "ClickHouse client configured (url={}, database={}, max_connections={})",
            config.url,
            config.database,
            config.max_connections
        );

        Ok(Self {
            client,
            config,
            permits,
        })
    }

    /// Run `sql` and return the raw response body.
    async fn execute(&self, sql: String) -> FederationResult<String> {
        let _permit = self.permits.acquire().await.map_err(|e| {
            FederationError::unavailable_with_context(
                e.to_string(),
                ErrorContext::new("acquire_permit"),
            )
        })?;

        let response = self
            .client
            .post(&self.config.url)
            .query(&[
                ("database", self.config.database.as_str()),
                ("output_format_json_quote_64bit_integers", "0"),
            ])
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password)
            .body(sql)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FederationError::query_with_context(
                format!("ClickHouse request failed ({}): {}", status, body.trim()),
                ErrorContext::new("execute"),
            ));
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(&self, sql: String) -> FederationResult<Vec<T>> {
        let body = self.execute(format!("{} FORMAT JSONEachRow", sql)).await?;
        parse_rows(&body)
    }
}

/// Decode a `JSONEachRow` body.
fn parse_rows<T: DeserializeOwned>(body: &str) -> FederationResult<Vec<T>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                FederationError::query_with_context(
                    format!("Failed to decode row: {}", e),
                    ErrorContext::new("parse_rows").with_details(line.to_string()),
                )
            })
        })
        .collect()
}

fn id_list(ids: &[ObjectId]) -> String {
    ids.iter()
        .map(ObjectId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn and_conditions(conditions: &[&str]) -> String {
    conditions.iter().map(|c| format!(" AND {}", c)).collect()
}

pub(crate) fn summary_sql(release: &ReleaseDescriptor, ids: &[ObjectId]) -> String {
    format!(
        "SELECT {} FROM {} WHERE oid IN ({}){}",
        SUMMARY_COLUMNS,
        release.summary_table,
        id_list(ids),
        and_conditions(&release.quality.summary_conditions()),
    )
}

pub(crate) fn short_summary_sql(table: &str, ids: &[ObjectId]) -> String {
    format!(
        "SELECT oid, ngoodobs, durgood FROM {} WHERE oid IN ({})",
        table,
        id_list(ids)
    )
}

pub(crate) fn object_observations_sql(release: &ReleaseDescriptor, summary: &SummaryRow) -> String {
    let locality = summary
        .h3index10
        .map(|cell| format!("h3index10 = {} AND ", cell))
        .unwrap_or_default();
    format!(
        "SELECT {} FROM {} WHERE {}oid = {}{} ORDER BY mjd",
        OBSERVATION_COLUMNS,
        release.observation_table,
        locality,
        summary.oid,
        and_conditions(&release.quality.observation_conditions()),
    )
}

pub(crate) fn region_observations_sql(
    release: &ReleaseDescriptor,
    predicate: &RegionPredicate,
) -> FederationResult<String> {
    Ok(format!(
        "SELECT {} FROM {} WHERE {}{} ORDER BY {}",
        OBSERVATION_COLUMNS,
        release.observation_table,
        indexed_sql(predicate)?,
        and_conditions(&release.quality.observation_conditions()),
        predicate.ordering(),
    ))
}

pub(crate) fn region_ids_sql(
    release: &ReleaseDescriptor,
    predicate: &RegionPredicate,
) -> FederationResult<String> {
    Ok(format!(
        "SELECT oid FROM {} WHERE {}{} ORDER BY oid",
        release.summary_table,
        indexed_sql(predicate)?,
        and_conditions(&release.quality.summary_conditions()),
    ))
}

fn indexed_sql(predicate: &RegionPredicate) -> FederationResult<String> {
    match predicate {
        RegionPredicate::Indexed(p) => Ok(p.to_sql()),
        RegionPredicate::Analytic(_) => Err(FederationError::query_with_context(
            "ClickHouse backend cannot evaluate a pg_sphere predicate",
            ErrorContext::new("region_predicate"),
        )),
    }
}

#[async_trait]
impl SpatialBackend for ClickHouseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Indexed
    }

    fn capacity(&self) -> usize {
        self.config.max_connections.max(1)
    }

    async fn health_check(&self) -> FederationResult<()> {
        self.execute("SELECT 1".to_string())
            .await
            .map(|_| ())
            .map_err(|e| match e {
                // Server up but refusing queries is still "not ready"
                FederationError::QueryError { message, .. } => {
                    FederationError::unavailable_with_context(
                        message,
                        ErrorContext::new("health_check").retryable(),
                    )
                }
                other => other.with_operation("health_check"),
            })
    }

    async fn fetch_summaries(
        &self,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<SummaryRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Fetching {} summaries from {}", ids.len(), release.summary_table);
        let records: Vec<SummaryRecord> = self
            .fetch(summary_sql(release, ids))
            .await
            .map_err(|e| e.with_operation("fetch_summaries").with_release(release.name.as_str()))?;
        records.into_iter().map(SummaryRecord::into_summary).collect()
    }

    async fn fetch_short_summaries(
        &self,
        table: &str,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<ShortSummaryRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<ShortSummaryRecord> = self
            .fetch(short_summary_sql(table, ids))
            .await
            .map_err(|e| e.with_operation("fetch_short_summaries"))?;
        Ok(records
            .into_iter()
            .map(|r| ShortSummaryRow {
                oid: ObjectId(r.oid),
                ngoodobs: r.ngoodobs,
                durgood: r.durgood,
            })
            .collect())
    }

    async fn fetch_object_observations(
        &self,
        release: &ReleaseDescriptor,
        summary: &SummaryRow,
    ) -> FederationResult<Vec<ObservationRow>> {
        let records: Vec<ObservationRecord> = self
            .fetch(object_observations_sql(release, summary))
            .await
            .map_err(|e| {
                e.with_operation("fetch_object_observations")
                    .with_release(release.name.as_str())
            })?;
        Ok(records.into_iter().map(ObservationRow::from).collect())
    }

    async fn fetch_region_observations(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObservationRow>> {
        let sql = region_observations_sql(release, predicate)?;
        let records: Vec<ObservationRecord> = self.fetch(sql).await.map_err(|e| {
            e.with_operation("fetch_region_observations")
                .with_release(release.name.as_str())
        })?;
        Ok(records.into_iter().map(ObservationRow::from).collect())
    }

    async fn fetch_region_object_ids(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObjectId>> {
        let sql = region_ids_sql(release, predicate)?;
        let records: Vec<IdRecord> = self.fetch(sql).await.map_err(|e| {
            e.with_operation("fetch_region_object_ids")
                .with_release(release.name.as_str())
        })?;
        Ok(records.into_iter().map(|r| ObjectId(r.oid)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegionQuery;

    fn summary() -> SummaryRow {
        SummaryRow {
            oid: ObjectId(830202400008402),
            nobs: 3,
            ngoodobs: 3,
            durgood: 0.4,
            filter: 2,
            fieldid: 830,
            rcid: 8,
            coord: SphericalPoint::new(10.0, 30.0).unwrap(),
            h3index10: Some(622236750694711295),
        }
    }

    #[test]
    fn test_parse_json_each_row() {
        let body = concat!(
            r#"{"oid":1,"mjd":58200.1,"mag":18.5,"magerr":0.05,"clrcoeff":0.1,"catflags":0}"#,
            "\n",
            r#"{"oid":1,"mjd":58200.3,"mag":18.4,"magerr":0.04,"clrcoeff":0.1,"catflags":0}"#,
            "\n\n"
        );
        let rows: Vec<ObservationRecord> = parse_rows(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].mjd, 58200.3);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_rows::<IdRecord>("{\"oid\": \"x\"}").unwrap_err();
        assert!(matches!(err, FederationError::QueryError { .. }));
    }

    #[test]
    fn test_summary_sql_applies_cuts() {
        let release = ReleaseDescriptor::indexed("dr8", false);
        let sql = summary_sql(&release, &[ObjectId(1), ObjectId(2)]);
        assert!(sql.ends_with("FROM dr8_meta WHERE oid IN (1, 2) AND ngoodobs > 0"));
        let legacy = summary_sql(&ReleaseDescriptor::dr2_legacy(), &[ObjectId(1)]);
        assert!(legacy.ends_with("WHERE oid IN (1)"));
    }

    #[test]
    fn test_object_observations_sql_uses_cell() {
        let release = ReleaseDescriptor::indexed("dr3", true);
        let sql = object_observations_sql(&release, &summary());
        assert!(sql.contains(
            "FROM dr3 WHERE h3index10 = 622236750694711295 AND oid = 830202400008402 \
             AND catflags = 0 AND magerr > 0 ORDER BY mjd"
        ));
    }

    #[test]
    fn test_region_sql_ordering() {
        let query = RegionQuery::cone(10.0, 30.0, 10.0).unwrap();
        let predicate = RegionPredicate::build(BackendKind::Indexed, &query).unwrap();
        let sql = region_observations_sql(&ReleaseDescriptor::indexed("dr8", false), &predicate)
            .unwrap();
        assert!(sql.contains("WHERE h3index10 IN ("));
        assert!(sql.contains("greatCircleAngle(10, 30, ra, dec)"));
        assert!(sql.ends_with("AND catflags = 0 AND magerr > 0 ORDER BY h3index10, oid, mjd"));

        let analytic = RegionPredicate::build(BackendKind::Analytic, &query).unwrap();
        assert!(region_ids_sql(&ReleaseDescriptor::dr2_legacy(), &analytic).is_err());
    }
}
