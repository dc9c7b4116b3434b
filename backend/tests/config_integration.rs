mod support;

use std::io::Write;
use std::time::Duration;

use support::with_scoped_env;
use ztf_lc::config::{ApiVersion, RepositoryType};
use ztf_lc::{FederationError, ServiceConfig};

const ENV_KEYS: [&str; 18] = [
    "HOST",
    "PORT",
    "API_VERSION",
    "LATEST_DR",
    "AVAILABLE_DRS",
    "REPOSITORY_TYPE",
    "REQUEST_TIMEOUT_SEC",
    "STARTUP_INTERVAL_SEC",
    "DATABASE_URL",
    "PG_DATABASE_URL",
    "PG_POOL_MAX",
    "PG_POOL_MIN",
    "PG_CONN_TIMEOUT_SEC",
    "PG_IDLE_TIMEOUT_SEC",
    "PG_MAX_RETRIES",
    "PG_RETRY_DELAY_MS",
    "CLICKHOUSE_MAX_CONNECTIONS",
    "CLICKHOUSE_TIMEOUT_SEC",
];

fn cleared_env() -> Vec<(&'static str, Option<&'static str>)> {
    ENV_KEYS.iter().map(|k| (*k, None)).collect()
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_then_env_overrides() {
    let file = write_config(
        r#"
[server]
port = 9000
api_version = "v1"

[releases]
latest = "dr4"
"#,
    );

    let mut env = cleared_env();
    env.push(("API_VERSION", Some("v2:v3")));
    env.push(("AVAILABLE_DRS", Some("dr3:dr8")));
    env.push(("LATEST_DR", Some("dr8")));
    env.push(("REQUEST_TIMEOUT_SEC", Some("15")));

    with_scoped_env(&env, || {
        let mut config = ServiceConfig::from_file(file.path()).unwrap();
        config.apply_env().unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.port, 9000);
        let versions = config.api_versions().unwrap();
        assert!(!versions.contains(ApiVersion::V1));
        assert!(versions.contains(ApiVersion::V3));
        assert_eq!(config.request_timeout(), Duration::from_secs(15));

        let catalogue = config.catalogue().unwrap();
        assert_eq!(catalogue.list(), vec!["dr3", "dr8", "latest"]);
        assert!(matches!(
            catalogue.resolve("dr4"),
            Err(FederationError::UnknownRelease { .. })
        ));
        assert_eq!(catalogue.resolve("latest").unwrap().name, "dr8");
    });
}

#[test]
fn test_alias_hidden_when_target_unavailable() {
    let mut env = cleared_env();
    env.push(("AVAILABLE_DRS", Some("dr2:dr3")));

    with_scoped_env(&env, || {
        let mut config = ServiceConfig::default();
        config.apply_env().unwrap();
        let catalogue = config.catalogue().unwrap();
        assert_eq!(catalogue.list(), vec!["dr2", "dr3"]);
        assert!(catalogue.resolve("latest").is_err());
    });
}

#[test]
fn test_invalid_env_values_are_configuration_errors() {
    let cases: [(&str, &str); 9] = [
        ("PORT", "eighty"),
        ("REQUEST_TIMEOUT_SEC", "-1"),
        ("API_VERSION", "v4"),
        ("STARTUP_INTERVAL_SEC", "0"),
        ("PG_POOL_MAX", "0"),
        ("PG_POOL_MIN", "50"),
        ("PG_RETRY_DELAY_MS", "soon"),
        ("CLICKHOUSE_MAX_CONNECTIONS", "0"),
        ("CLICKHOUSE_TIMEOUT_SEC", "1.5"),
    ];
    for (key, value) in cases {
        let mut env = cleared_env();
        env.push((key, Some(value)));
        let result = with_scoped_env(&env, || {
            let mut config = ServiceConfig::default();
            config.apply_env().and_then(|_| config.validate())
        });
        assert!(
            matches!(result, Err(FederationError::ConfigurationError { .. })),
            "{}={}",
            key,
            value
        );
    }
}

#[test]
fn test_backend_pool_overrides() {
    let mut env = cleared_env();
    env.push(("PG_POOL_MAX", Some("24")));
    env.push(("PG_POOL_MIN", Some("4")));
    env.push(("PG_CONN_TIMEOUT_SEC", Some("5")));
    env.push(("PG_IDLE_TIMEOUT_SEC", Some("120")));
    env.push(("PG_MAX_RETRIES", Some("7")));
    env.push(("PG_RETRY_DELAY_MS", Some("250")));
    env.push(("CLICKHOUSE_MAX_CONNECTIONS", Some("3")));
    env.push(("CLICKHOUSE_TIMEOUT_SEC", Some("20")));

    with_scoped_env(&env, || {
        let mut config = ServiceConfig::default();
        config.apply_env().unwrap();
        config.validate().unwrap();

        assert_eq!(config.postgres.max_connections, 24);
        assert_eq!(config.postgres.min_connections, 4);
        assert_eq!(config.postgres.connect_timeout, 5);
        assert_eq!(config.postgres.idle_timeout, 120);
        assert_eq!(config.postgres.max_retries, 7);
        assert_eq!(config.postgres.retry_delay_ms, 250);
        assert_eq!(config.clickhouse.max_connections, 3);
        assert_eq!(config.clickhouse.timeout_sec, 20);
    });
}

#[test]
fn test_repository_type_and_database_url() {
    let mut env = cleared_env();
    env.push(("REPOSITORY_TYPE", Some("remote")));
    env.push(("DATABASE_URL", Some("postgres://app@db/ztf")));

    with_scoped_env(&env, || {
        let mut config = ServiceConfig::default();
        config.apply_env().unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Remote);
        assert_eq!(config.postgres.database_url, "postgres://app@db/ztf");
    });
}

#[test]
fn test_unreadable_file_is_configuration_error() {
    let err = ServiceConfig::from_file("/nonexistent/lightcurves.toml").unwrap_err();
    assert!(matches!(err, FederationError::ConfigurationError { .. }));

    let file = write_config("[server]\nport = \"not a number\"\n");
    let err = ServiceConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, FederationError::ConfigurationError { .. }));
}
