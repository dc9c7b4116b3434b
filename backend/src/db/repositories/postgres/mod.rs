//! Postgres + pg_sphere backend using Diesel.
//!
//! Serves the analytic backend family: point/circle native tables queried
//! with exact containment predicates.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Blocking Diesel calls isolated on `spawn_blocking`
//!
//! ## Configuration
//!
//! Built by [`crate::config::ServiceConfig::postgres_config`] from the
//! `[postgres]` section, with these environment overrides:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)
//!
//! ## Tables
//!
//! A release `{dr}` is read from `{summary_table}` joined with `{dr}_info`
//! on `oid`, and from `{observation_table}`.

use async_trait::async_trait;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Integer, Text};
use std::time::Duration;
use tokio::task;

use crate::db::predicate::{RegionPredicate, SqlParam};
use crate::db::releases::{BackendKind, ReleaseDescriptor};
use crate::db::repository::SpatialBackend;
use crate::error::{ErrorContext, FederationError, FederationResult};
use crate::models::{ObjectId, ObservationRow, ShortSummaryRow, SummaryRow};

mod models;

use models::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const SUMMARY_COLUMNS: &str = "oid::bigint AS oid, nobs::bigint AS nobs, \
    ngoodobs::bigint AS ngoodobs, durgood::double precision AS durgood, \
    filter::text AS filter, fieldid::bigint AS fieldid, rcid::bigint AS rcid, \
    coord::text AS coord";

const OBSERVATION_COLUMNS: &str = "oid::bigint AS oid, mjd::double precision AS mjd, \
    mag::double precision AS mag, magerr::double precision AS magerr, \
    clrcoeff::double precision AS clrcoeff, catflags::integer AS catflags";

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Diesel-backed gateway for the pg_sphere tables.
#[derive(Clone, Debug)]
pub struct PostgresBackend {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresBackend {
    /// Create the pool without waiting for the server.
    ///
    /// Connections are established lazily; use the readiness probe to wait
    /// for the database to come up.
    pub fn new(config: PostgresConfig) -> FederationResult<Self> {
        if config.database_url.is_empty() {
            return Err(FederationError::configuration("Postgres database URL is empty"));
        }
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build_unchecked(manager);

        log::info!(
            "Postgres pool configured (max_size={}, min_idle={})",
            config.max_pool_size,
            config.min_pool_size
        );

        Ok(Self { pool, config })
    }

    /// Execute a database operation with automatic retry for transient failures.
    ///
    /// Retries up to `max_retries` times on retryable errors (connection
    /// errors, serialization failures), doubling the delay each time.
    async fn with_conn<T, F>(&self, f: F) -> FederationResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> FederationResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    log::warn!(
                        "Retrying Postgres operation (attempt {}/{})",
                        attempt + 1,
                        max_retries + 1
                    );
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = FederationError::unavailable_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                FederationError::query("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            FederationError::query_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn info_table(release: &ReleaseDescriptor) -> String {
    format!("{}_info", release.name)
}

fn and_conditions(conditions: &[&str]) -> String {
    conditions.iter().map(|c| format!(" AND {}", c)).collect()
}

pub(crate) fn summary_sql(release: &ReleaseDescriptor) -> String {
    format!(
        "SELECT {} FROM {} INNER JOIN {} USING (oid) WHERE oid = ANY($1){}",
        SUMMARY_COLUMNS,
        release.summary_table,
        info_table(release),
        and_conditions(&release.quality.summary_conditions()),
    )
}

pub(crate) fn object_observations_sql(release: &ReleaseDescriptor) -> String {
    format!(
        "SELECT {} FROM {} WHERE oid = $1{} ORDER BY mjd",
        OBSERVATION_COLUMNS,
        release.observation_table,
        and_conditions(&release.quality.observation_conditions()),
    )
}

pub(crate) fn region_observations_sql(release: &ReleaseDescriptor, where_clause: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE oid IN (SELECT oid FROM {} WHERE {}){} ORDER BY oid, mjd",
        OBSERVATION_COLUMNS,
        release.observation_table,
        release.summary_table,
        where_clause,
        and_conditions(&release.quality.observation_conditions()),
    )
}

pub(crate) fn region_ids_sql(release: &ReleaseDescriptor, where_clause: &str) -> String {
    format!(
        "SELECT oid::bigint AS oid FROM {} WHERE {}{} ORDER BY oid",
        release.summary_table,
        where_clause,
        and_conditions(&release.quality.summary_conditions()),
    )
}

fn bind_params<'f>(
    mut query: BoxedSqlQuery<'f, Pg, SqlQuery>,
    params: Vec<SqlParam>,
) -> BoxedSqlQuery<'f, Pg, SqlQuery> {
    for param in params {
        query = match param {
            SqlParam::Text(value) => query.bind::<Text, _>(value),
            SqlParam::TextArray(values) => query.bind::<Array<Text>, _>(values),
            SqlParam::IntArray(values) => query.bind::<Array<Integer>, _>(values),
        };
    }
    query
}

fn analytic_parts(predicate: &RegionPredicate) -> FederationResult<(String, Vec<SqlParam>)> {
    match predicate {
        RegionPredicate::Analytic(p) => Ok((p.where_clause(), p.params().to_vec())),
        RegionPredicate::Indexed(_) => Err(FederationError::query_with_context(
            "Postgres backend cannot evaluate a hex-cell predicate",
            ErrorContext::new("region_predicate"),
        )),
    }
}

fn to_db_ids(ids: &[ObjectId]) -> Vec<i64> {
    ids.iter().filter_map(|id| i64::try_from(id.0).ok()).collect()
}

#[async_trait]
impl SpatialBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Analytic
    }

    fn capacity(&self) -> usize {
        self.config.max_pool_size as usize
    }

    async fn health_check(&self) -> FederationResult<()> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| ())
                .map_err(|e| {
                    // Anything failing a trivial probe means "not up yet"
                    FederationError::unavailable_with_context(
                        e.to_string(),
                        ErrorContext::new("health_check").retryable(),
                    )
                })
        })
        .await
    }

    async fn fetch_summaries(
        &self,
        release: &ReleaseDescriptor,
        ids: &[ObjectId],
    ) -> FederationResult<Vec<SummaryRow>> {
        let sql = summary_sql(release);
        let ids = to_db_ids(ids);
        log::debug!("Fetching {} summaries from {}", ids.len(), release.summary_table);

        let records = self
            .with_conn(move |conn| {
                sql_query(sql)
                    .bind::<Array<BigInt>, _>(ids)
                    .load::<SummaryRecord>(conn)
                    .map_err(FederationError::from)
            })
            .await
            .map_err(|e| e.with_operation("fetch_summaries").with_release(release.name.as_str()))?;

        records
            .into_iter()
            .map(SummaryRecord::into_summary)
            .collect::<FederationResult<Vec<_>>>()
            .map_err(|e| e.with_release(release.name.as_str()))
    }

    async fn fetch_short_summaries(
        &self,
        table: &str,
        _ids: &[ObjectId],
    ) -> FederationResult<Vec<ShortSummaryRow>> {
        Err(FederationError::query_with_context(
            format!("short summary table {} is not served by Postgres", table),
            ErrorContext::new("fetch_short_summaries"),
        ))
    }

    async fn fetch_object_observations(
        &self,
        release: &ReleaseDescriptor,
        summary: &SummaryRow,
    ) -> FederationResult<Vec<ObservationRow>> {
        let sql = object_observations_sql(release);
        let oid = to_db_ids(&[summary.oid]).first().copied().unwrap_or(-1);

        let records = self
            .with_conn(move |conn| {
                sql_query(sql)
                    .bind::<BigInt, _>(oid)
                    .load::<ObservationRecord>(conn)
                    .map_err(FederationError::from)
            })
            .await
            .map_err(|e| {
                e.with_operation("fetch_object_observations")
                    .with_release(release.name.as_str())
            })?;

        records
            .into_iter()
            .map(ObservationRecord::into_observation)
            .collect()
    }

    async fn fetch_region_observations(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObservationRow>> {
        let (where_clause, params) = analytic_parts(predicate)?;
        let sql = region_observations_sql(release, &where_clause);
        log::debug!("Region query on {}: {}", release.name, where_clause);

        let records = self
            .with_conn(move |conn| {
                bind_params(sql_query(sql).into_boxed::<Pg>(), params)
                    .load::<ObservationRecord>(conn)
                    .map_err(FederationError::from)
            })
            .await
            .map_err(|e| {
                e.with_operation("fetch_region_observations")
                    .with_release(release.name.as_str())
            })?;

        records
            .into_iter()
            .map(ObservationRecord::into_observation)
            .collect()
    }

    async fn fetch_region_object_ids(
        &self,
        release: &ReleaseDescriptor,
        predicate: &RegionPredicate,
    ) -> FederationResult<Vec<ObjectId>> {
        let (where_clause, params) = analytic_parts(predicate)?;
        let sql = region_ids_sql(release, &where_clause);

        let records = self
            .with_conn(move |conn| {
                bind_params(sql_query(sql).into_boxed::<Pg>(), params)
                    .load::<IdRecord>(conn)
                    .map_err(FederationError::from)
            })
            .await
            .map_err(|e| {
                e.with_operation("fetch_region_object_ids")
                    .with_release(release.name.as_str())
            })?;

        Ok(records
            .into_iter()
            .filter_map(|r| u64::try_from(r.oid).ok().map(ObjectId))
            .collect())
    }
}
