//! Service configuration.
//!
//! Settings are read from a TOML file (`lightcurves.toml`) and then
//! overridden by environment variables, so container deployments can run
//! without a file at all.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! api_version = "v1:v3"
//! request_timeout_sec = 60
//!
//! [releases]
//! latest = "dr8"
//! available = "all"
//!
//! [repository]
//! type = "remote"
//!
//! [postgres]
//! database_url = "postgres://app@db/ztf"
//!
//! [clickhouse]
//! url = "http://clickhouse:8123"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::db::readiness::ReadinessPolicy;
use crate::db::releases::{Availability, ReleaseCatalogue};
use crate::error::{FederationError, FederationResult};

/// File name searched by [`ServiceConfig::from_default_location`].
pub const CONFIG_FILE_NAME: &str = "lightcurves.toml";

/// One generation of the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApiVersion {
    V1,
    V2,
    V3,
}

impl ApiVersion {
    pub const ALL: [ApiVersion; 3] = [ApiVersion::V1, ApiVersion::V2, ApiVersion::V3];
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V1 => f.write_str("v1"),
            ApiVersion::V2 => f.write_str("v2"),
            ApiVersion::V3 => f.write_str("v3"),
        }
    }
}

/// The set of enabled API generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersions(BTreeSet<ApiVersion>);

impl ApiVersions {
    pub fn all() -> Self {
        Self(ApiVersion::ALL.into_iter().collect())
    }

    pub fn contains(&self, version: ApiVersion) -> bool {
        self.0.contains(&version)
    }

    pub fn iter(&self) -> impl Iterator<Item = ApiVersion> + '_ {
        self.0.iter().copied()
    }

    /// v1 reads the relational backend.
    pub fn needs_analytic(&self) -> bool {
        self.contains(ApiVersion::V1)
    }

    /// v2 and v3 read the hex-indexed backend.
    pub fn needs_indexed(&self) -> bool {
        self.contains(ApiVersion::V2) || self.contains(ApiVersion::V3)
    }
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for ApiVersions {
    type Err = FederationError;

    /// Parse `all` or a `:`-separated subset of `v1`, `v2`, `v3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut versions = BTreeSet::new();
        for part in s.to_lowercase().split(':').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "all" => return Ok(Self::all()),
                "v1" => versions.insert(ApiVersion::V1),
                "v2" => versions.insert(ApiVersion::V2),
                "v3" => versions.insert(ApiVersion::V3),
                other => {
                    return Err(FederationError::configuration(format!(
                        "API_VERSION has unknown version \"{}\", expected all or a subset of v1:v2:v3",
                        other
                    )))
                }
            };
        }
        if versions.is_empty() {
            return Err(FederationError::configuration(
                "API_VERSION should enable at least one API version",
            ));
        }
        Ok(Self(versions))
    }
}

/// Which backend implementations to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Postgres and ClickHouse
    Remote,
    /// In-memory backends
    Local,
}

impl FromStr for RepositoryType {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "database" | "db" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            _ => Err(FederationError::configuration(format!(
                "Unknown repository type: {}",
                s
            ))),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub releases: ReleaseSettings,
    #[serde(default)]
    pub startup: StartupSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub clickhouse: ClickHouseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `all` or `:`-separated subset of v1, v2, v3
    #[serde(default = "default_all")]
    pub api_version: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_sec: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_version: default_all(),
            request_timeout_sec: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
    #[serde(default = "default_latest")]
    pub latest: String,
    /// `all` or `:`-separated release names
    #[serde(default = "default_all")]
    pub available: String,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            latest: default_latest(),
            available: default_all(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupSettings {
    #[serde(default = "default_wait")]
    pub wait_sec: u64,
    #[serde(default = "default_interval")]
    pub interval_sec: u64,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            wait_sec: default_wait(),
            interval_sec: default_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// ClickHouse HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseSettings {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_database")]
    pub database: String,
    #[serde(default = "default_clickhouse_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_clickhouse_connections")]
    pub max_connections: usize,
    #[serde(default = "default_request_timeout")]
    pub timeout_sec: u64,
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_database(),
            user: default_clickhouse_user(),
            password: String::new(),
            max_connections: default_clickhouse_connections(),
            timeout_sec: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_all() -> String {
    "all".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_latest() -> String {
    crate::db::releases::DEFAULT_LATEST.to_string()
}

fn default_wait() -> u64 {
    900
}

fn default_interval() -> u64 {
    1
}

fn default_repo_type() -> String {
    "local".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "ztf".to_string()
}

fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_clickhouse_connections() -> usize {
    10
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn env_parsed<T: FromStr>(key: &str, target: &mut T) -> FederationResult<()> {
    if let Ok(value) = std::env::var(key) {
        *target = value.trim().parse::<T>().map_err(|_| {
            FederationError::configuration(format!("{} has invalid value \"{}\"", key, value))
        })?;
    }
    Ok(())
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> FederationResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            FederationError::configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            FederationError::configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `lightcurves.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> FederationResult<Self> {
        let path = Self::find_default_file().ok_or_else(|| {
            FederationError::configuration(format!(
                "No {} found in standard locations",
                CONFIG_FILE_NAME
            ))
        })?;
        log::info!("Loading configuration from {}", path.display());
        Self::from_file(&path)
    }

    fn find_default_file() -> Option<PathBuf> {
        [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("backend").join(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    /// Default-location file if present, defaults otherwise, then environment
    /// overrides. The result is validated.
    pub fn load() -> FederationResult<Self> {
        let mut config = if Self::find_default_file().is_some() {
            Self::from_default_location()?
        } else {
            log::info!("No {} found; using defaults", CONFIG_FILE_NAME);
            Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment variables.
    pub fn apply_env(&mut self) -> FederationResult<()> {
        env_string("HOST", &mut self.server.host);
        env_parsed("PORT", &mut self.server.port)?;
        env_string("API_VERSION", &mut self.server.api_version);
        env_parsed("REQUEST_TIMEOUT_SEC", &mut self.server.request_timeout_sec)?;

        env_string("LATEST_DR", &mut self.releases.latest);
        env_string("AVAILABLE_DRS", &mut self.releases.available);

        env_parsed("STARTUP_WAIT_SEC", &mut self.startup.wait_sec)?;
        env_parsed("STARTUP_INTERVAL_SEC", &mut self.startup.interval_sec)?;

        env_string("REPOSITORY_TYPE", &mut self.repository.repo_type);

        if let Ok(url) = std::env::var("DATABASE_URL").or_else(|_| std::env::var("PG_DATABASE_URL")) {
            self.postgres.database_url = url;
        }
        env_parsed("PG_POOL_MAX", &mut self.postgres.max_connections)?;
        env_parsed("PG_POOL_MIN", &mut self.postgres.min_connections)?;
        env_parsed("PG_CONN_TIMEOUT_SEC", &mut self.postgres.connect_timeout)?;
        env_parsed("PG_IDLE_TIMEOUT_SEC", &mut self.postgres.idle_timeout)?;
        env_parsed("PG_MAX_RETRIES", &mut self.postgres.max_retries)?;
        env_parsed("PG_RETRY_DELAY_MS", &mut self.postgres.retry_delay_ms)?;

        env_string("CLICKHOUSE_URL", &mut self.clickhouse.url);
        env_string("CLICKHOUSE_USER", &mut self.clickhouse.user);
        env_string("CLICKHOUSE_PASSWORD", &mut self.clickhouse.password);
        env_string("CLICKHOUSE_DATABASE", &mut self.clickhouse.database);
        env_parsed("CLICKHOUSE_MAX_CONNECTIONS", &mut self.clickhouse.max_connections)?;
        env_parsed("CLICKHOUSE_TIMEOUT_SEC", &mut self.clickhouse.timeout_sec)?;
        Ok(())
    }

    /// Check every derived setting once, at startup.
    pub fn validate(&self) -> FederationResult<()> {
        self.api_versions()?;
        self.repository_type()?;
        self.catalogue()?;
        let positive = [
            ("request timeout", self.server.request_timeout_sec),
            ("startup probe interval", self.startup.interval_sec),
            ("postgres pool size", u64::from(self.postgres.max_connections)),
            ("clickhouse connection limit", self.clickhouse.max_connections as u64),
            ("clickhouse timeout", self.clickhouse.timeout_sec),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(FederationError::configuration(format!(
                    "{} should be positive",
                    name
                )));
            }
        }
        if self.postgres.min_connections > self.postgres.max_connections {
            return Err(FederationError::configuration(
                "postgres min pool size exceeds max pool size",
            ));
        }
        Ok(())
    }

    pub fn api_versions(&self) -> FederationResult<ApiVersions> {
        self.server.api_version.parse()
    }

    pub fn repository_type(&self) -> FederationResult<RepositoryType> {
        self.repository.repo_type.parse()
    }

    /// The multi-release catalogue with the configured alias and restriction.
    pub fn catalogue(&self) -> FederationResult<ReleaseCatalogue> {
        let availability: Availability = self.releases.available.parse()?;
        Ok(ReleaseCatalogue::standard()
            .with_latest(&self.releases.latest)?
            .with_availability(availability))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_sec)
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            wait_for: Duration::from_secs(self.startup.wait_sec),
            interval: Duration::from_secs(self.startup.interval_sec),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[cfg(feature = "postgres-repo")]
    pub fn postgres_config(&self) -> FederationResult<crate::db::repositories::PostgresConfig> {
        if self.postgres.database_url.is_empty() {
            return Err(FederationError::configuration(
                "API v1 requires 'postgres.database_url' or DATABASE_URL",
            ));
        }
        Ok(crate::db::repositories::PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
            min_pool_size: self.postgres.min_connections,
            connection_timeout_sec: self.postgres.connect_timeout,
            idle_timeout_sec: self.postgres.idle_timeout,
            max_retries: self.postgres.max_retries,
            retry_delay_ms: self.postgres.retry_delay_ms,
        })
    }

    #[cfg(feature = "clickhouse-repo")]
    pub fn clickhouse_config(&self) -> crate::db::repositories::ClickHouseConfig {
        crate::db::repositories::ClickHouseConfig {
            url: self.clickhouse.url.clone(),
            database: self.clickhouse.database.clone(),
            user: self.clickhouse.user.clone(),
            password: self.clickhouse.password.clone(),
            max_connections: self.clickhouse.max_connections,
            timeout_sec: self.clickhouse.timeout_sec,
        }
    }
}
