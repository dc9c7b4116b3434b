//! Router tests over in-memory backends.

#![cfg(feature = "http-server")]

mod support;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use support::{observations, summary, EXAMPLE_OID};
use ztf_lc::config::ApiVersions;
use ztf_lc::db::releases::{BackendKind, ReleaseCatalogue, ReleaseDescriptor};
use ztf_lc::db::repositories::LocalBackend;
use ztf_lc::http::{create_router, AppState};
use ztf_lc::FederationEngine;

struct Fixture {
    analytic: LocalBackend,
    indexed: LocalBackend,
}

impl Fixture {
    fn new() -> Self {
        let analytic = LocalBackend::new(BackendKind::Analytic);
        let indexed = LocalBackend::new(BackendKind::Indexed);

        analytic
            .insert_object(
                &ReleaseDescriptor::dr1(),
                summary(695211400034403, 292.4, 44.6),
                observations(695211400034403, &[58250.3, 58250.1]),
            )
            .unwrap();
        for release in [
            ReleaseDescriptor::dr2_legacy(),
            ReleaseDescriptor::indexed("dr8", false),
        ] {
            indexed
                .insert_object(
                    &release,
                    summary(EXAMPLE_OID, 10.0, 30.0),
                    observations(EXAMPLE_OID, &[58200.1, 58200.3, 58199.9]),
                )
                .unwrap();
        }
        Self { analytic, indexed }
    }

    fn router(&self, versions: &str) -> Router {
        let engine = FederationEngine::default()
            .with_backend(Arc::new(self.analytic.clone()))
            .with_backend(Arc::new(self.indexed.clone()));
        let versions: ApiVersions = versions.parse().unwrap();
        create_router(AppState::new(engine, ReleaseCatalogue::standard(), versions))
    }
}

async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(router, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_v3_oid_full() {
    let fixture = Fixture::new();
    let uri = format!("/api/v3/data/latest/oid/full/json?oid={}", EXAMPLE_OID);
    let (status, json) = get_json(fixture.router("all"), &uri).await;

    assert_eq!(status, StatusCode::OK);
    let record = &json[EXAMPLE_OID.to_string()];
    let mjds: Vec<f64> = record["lc"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["mjd"].as_f64().unwrap())
        .collect();
    assert_eq!(mjds, vec![58199.9, 58200.1, 58200.3]);
    assert_eq!(record["meta"]["filter"], "zg");
    // v3 schema has no catflags column
    assert!(record["lc"][0].get("catflags").is_none());
}

#[tokio::test]
async fn test_v2_exposes_catflags() {
    let fixture = Fixture::new();
    let uri = format!("/api/v2/oid/full/json?oid={}&oid={}", EXAMPLE_OID, EXAMPLE_OID);
    let (status, json) = get_json(fixture.router("v2"), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_object().unwrap().len(), 1);
    assert_eq!(json[EXAMPLE_OID.to_string()]["lc"][0]["catflags"], 0);
}

#[tokio::test]
async fn test_v1_circle_endpoints() {
    let fixture = Fixture::new();
    let (status, json) = get_json(
        fixture.router("v1"),
        "/api/v1/circle/oid/json?ra=292.4&dec=44.6&radius_arcsec=5",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([695211400034403u64]));

    let (status, json) = get_json(
        fixture.router("v1"),
        "/api/v1/circle/full/json?ra=292.4&dec=44.6&radius_arcsec=5&filter=zr",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({}));
}

#[tokio::test]
async fn test_empty_circle_is_empty_object() {
    let fixture = Fixture::new();
    let (status, json) = get_json(
        fixture.router("all"),
        "/api/v3/data/dr8/circle/full/json?ra=10&dec=-30&radius_arcsec=10",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({}));
}

#[tokio::test]
async fn test_release_list() {
    let fixture = Fixture::new();
    let (status, json) = get_json(fixture.router("v3"), "/api/v3/dr/list/json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!(["dr2", "dr3", "dr4", "dr8", "latest"]));
}

#[tokio::test]
async fn test_client_errors() {
    let fixture = Fixture::new();
    let cases = [
        ("/api/v3/data/dr8/oid/full/json", StatusCode::BAD_REQUEST),
        ("/api/v3/data/dr8/oid/full/json?oid=abc", StatusCode::BAD_REQUEST),
        (
            "/api/v3/data/dr8/circle/full/json?ra=10&dec=30",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v3/data/dr8/circle/full/json?ra=10&dec=30&radius_arcsec=61",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v3/data/dr8/circle/full/json?ra=10&dec=30&radius_arcsec=0",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v3/data/dr8/circle/full/json?ra=10&dec=30&radius_arcsec=5&filter=zz",
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v3/data/dr8/circle/full/json?ra=10&dec=30&radius_arcsec=5&fieldid=x",
            StatusCode::BAD_REQUEST,
        ),
        ("/api/v3/data/dr99/oid/full/json?oid=1", StatusCode::NOT_FOUND),
    ];
    for (uri, expected) in cases {
        let (status, json) = get_json(fixture.router("all"), uri).await;
        assert_eq!(status, expected, "{}", uri);
        assert!(json["code"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn test_missing_oid_message() {
    let fixture = Fixture::new();
    let (_, json) = get_json(fixture.router("v3"), "/api/v3/data/dr8/oid/full/json").await;
    assert_eq!(json["code"], "INVALID_QUERY_PARAMETER");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("at least one \"oid\" field"));
}

#[tokio::test]
async fn test_disabled_versions_are_not_routed() {
    let fixture = Fixture::new();
    let (status, _) = get(fixture.router("v3"), "/api/v1/help").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = get_json(fixture.router("v3"), "/api/v2/oid/full/json?oid=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["message"], "No endpoint at /api/v2/oid/full/json");

    let (status, body) = get(fixture.router("v3"), "/").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("/api/v3/help"));
    assert!(!html.contains("/api/v1/help"));
}

#[tokio::test]
async fn test_help_pages() {
    let fixture = Fixture::new();
    for version in ["v1", "v2", "v3"] {
        let (status, body) = get(fixture.router("all"), &format!("/api/{}/help", version)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains(&format!("/api/{}/", version)));
    }
}

#[tokio::test]
async fn test_health_reports_each_backend() {
    let fixture = Fixture::new();
    let (status, json) = get_json(fixture.router("all"), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["backends"]["analytic"], "connected");

    fixture.indexed.set_healthy(false);
    let (_, json) = get_json(fixture.router("all"), "/health").await;
    assert_eq!(json["status"], "degraded");
    assert!(json["backends"]["indexed"]
        .as_str()
        .unwrap()
        .starts_with("error"));
}

#[tokio::test]
async fn test_unavailable_backend_is_503() {
    let fixture = Fixture::new();
    fixture.indexed.set_healthy(false);
    let uri = format!("/api/v3/data/dr8/oid/full/json?oid={}", EXAMPLE_OID);
    let (status, json) = get_json(fixture.router("all"), &uri).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "BACKEND_UNAVAILABLE");
}
