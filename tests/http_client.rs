//! `HttpClient` against a local mock of the control plane.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ec_provider::api::{ApiError, CloudApi, HttpClient, TrafficFilterRulesetRequest};
use ec_provider::config::{Credentials, EnvDefaults, ProviderConfig, VerboseSettings};
use ec_provider::{EcProvider, ProviderService};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const API_KEY: &str = "secret-key";

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    // admin:pw
    value == format!("ApiKey {}", API_KEY) || value == "Basic YWRtaW46cHc="
}

fn failure(status: StatusCode, code: &str, message: &str) -> axum::response::Response {
    (
        status,
        Json(json!({"errors": [{"code": code, "message": message}]})),
    )
        .into_response()
}

async fn stacks(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Path(region): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> axum::response::Response {
    if !authorized(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "root.unauthenticated", "The supplied authentication is invalid");
    }
    recorded.queries.lock().unwrap().push(query);
    if region != "us-east-1" {
        return failure(StatusCode::NOT_FOUND, "regions.region_not_found", "Region not found");
    }
    Json(json!({
        "stacks": [
            {"version": "7.10.0", "accessible": true, "whitelisted": true, "upgradable_to": []},
            {"version": "7.9.3", "accessible": true, "upgradable_to": ["7.10.0"]},
            {"version": "7.9.2", "accessible": true}
        ]
    }))
    .into_response()
}

async fn deployment(headers: HeaderMap, Path(id): Path<String>) -> axum::response::Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match id.as_str() {
        "forbidden" => StatusCode::FORBIDDEN.into_response(),
        "broken" => (StatusCode::OK, "not json").into_response(),
        _ => failure(
            StatusCode::NOT_FOUND,
            "deployments.deployment_not_found",
            "Deployment not found",
        ),
    }
}

async fn create_ruleset(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    recorded.bodies.lock().unwrap().push(body);
    Json(json!({"id": "ruleset-1"}))
}

async fn remove_association(Path((ruleset, kind, deployment)): Path<(String, String, String)>) -> StatusCode {
    if ruleset == "ruleset-1" && kind == "deployment" && deployment == "dep-1" {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn mock_control_plane() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/v1/regions/{region}/stack/versions", get(stacks))
        .route("/api/v1/deployments/{id}", get(deployment))
        .route("/api/v1/deployments/traffic-filter/rulesets", post(create_ruleset))
        .route(
            "/api/v1/deployments/traffic-filter/rulesets/{ruleset}/associations/{kind}/{deployment}",
            delete(remove_association),
        )
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), recorded)
}

fn config(endpoint: &str, credentials: Credentials) -> ProviderConfig {
    ProviderConfig {
        endpoint: endpoint.to_string(),
        credentials,
        insecure: false,
        timeout: Duration::from_secs(5),
        verbose: None,
    }
}

#[tokio::test]
async fn test_list_stacks_with_api_key() {
    let (endpoint, recorded) = mock_control_plane().await;
    let client = HttpClient::new(&config(&endpoint, Credentials::ApiKey(API_KEY.to_string()))).unwrap();

    let stacks = tokio_test::assert_ok!(client.list_stacks("us-east-1").await);
    let versions: Vec<_> = stacks.iter().map(|s| s.version.as_str()).collect();
    assert_eq!(versions, vec!["7.10.0", "7.9.3", "7.9.2"]);
    assert_eq!(stacks[0].allowlisted, Some(true));
    assert_eq!(stacks[1].upgradable_to, vec!["7.10.0"]);

    let queries = recorded.queries.lock().unwrap();
    assert_eq!(queries[0].get("show_deleted").map(String::as_str), Some("false"));
    assert_eq!(queries[0].get("show_unusable").map(String::as_str), Some("false"));
}

#[tokio::test]
async fn test_basic_auth() {
    let (endpoint, _) = mock_control_plane().await;
    let client = HttpClient::new(&config(
        &endpoint,
        Credentials::Basic {
            username: "admin".to_string(),
            password: "pw".to_string(),
        },
    ))
    .unwrap();
    assert_eq!(client.list_stacks("us-east-1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_error_statuses() {
    let (endpoint, _) = mock_control_plane().await;

    let bad_key = HttpClient::new(&config(&endpoint, Credentials::ApiKey("wrong".to_string()))).unwrap();
    let err = tokio_test::assert_err!(bad_key.list_stacks("us-east-1").await);
    assert_eq!(err.status_code(), Some(401));
    assert!(err.to_string().contains("root.unauthenticated"));

    let client = HttpClient::new(&config(&endpoint, Credentials::ApiKey(API_KEY.to_string()))).unwrap();
    let err = client.list_stacks("mars-north-1").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.get_deployment("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("Deployment not found"));

    let err = client.get_deployment("forbidden").await.unwrap_err();
    assert!(err.is_gone());
    assert!(!err.is_not_found());

    let err = client.get_deployment("broken").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_traffic_filter_calls() {
    let (endpoint, recorded) = mock_control_plane().await;
    let client = HttpClient::new(&config(&endpoint, Credentials::ApiKey(API_KEY.to_string()))).unwrap();

    let id = client
        .create_traffic_filter(&TrafficFilterRulesetRequest {
            name: "office".to_string(),
            region: "us-east-1".to_string(),
            kind: "ip".to_string(),
            include_by_default: false,
            description: None,
            rules: vec![],
        })
        .await
        .unwrap();
    assert_eq!(id, "ruleset-1");

    let body = recorded.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["name"], "office");
    assert_eq!(body["type"], "ip");
    assert_eq!(body["include_by_default"], false);

    tokio_test::assert_ok!(client.disassociate_traffic_filter("ruleset-1", "dep-1").await);
    let err = client
        .disassociate_traffic_filter("ruleset-1", "dep-2")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_verbose_log_redacts_credentials() {
    let (endpoint, _) = mock_control_plane().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("request.log");
    let mut cfg = config(&endpoint, Credentials::ApiKey(API_KEY.to_string()));
    cfg.verbose = Some(VerboseSettings {
        file: path.clone(),
        credentials: false,
    });

    let client = HttpClient::new(&cfg).unwrap();
    client.list_stacks("us-east-1").await.unwrap();

    let log = std::fs::read_to_string(&path).unwrap();
    assert!(log.contains("==> GET"));
    assert!(log.contains("/api/v1/regions/us-east-1/stack/versions"));
    assert!(log.contains("[REDACTED]"));
    assert!(!log.contains(API_KEY));
    assert!(log.contains("<== 200"));
}

#[tokio::test]
async fn test_provider_selects_stack_over_http() {
    let (endpoint, _) = mock_control_plane().await;
    let provider = EcProvider::new(EnvDefaults::default());
    let diagnostics = provider
        .configure(json!({"endpoint": endpoint, "apikey": API_KEY}))
        .await
        .unwrap();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    let stack = provider
        .read_data_source("ec_stack", json!({"version_regex": "7.9.?", "region": "us-east-1"}))
        .await
        .unwrap();
    assert_eq!(stack["version"], "7.9.3");
    assert_eq!(stack["id"], "us-east-1/7.9.?");
}
