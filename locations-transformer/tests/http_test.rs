use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use locations_transformer::record::RawRecord;
use locations_transformer::routes::create_router;
use locations_transformer::source::InMemorySource;
use locations_transformer::{AppState, FetcherConfig, LoadStatus};
use serde_json::Value;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BANKSVILLE_ID: &str = "Nstein_GL_US_NY_Municipality_942968";
const BANKSVILLE_UUID: &str = "095b89cd-4d4c-3195-ba78-e366fbe47291";

fn state_with(source: Arc<InMemorySource>) -> Arc<AppState> {
    Arc::new(AppState::with_source(source, FetcherConfig::default()))
}

fn banksville() -> Arc<InMemorySource> {
    Arc::new(InMemorySource::new(vec![RawRecord::new(
        BANKSVILLE_ID,
        "Banksville, New York",
    )]))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Option<String>, String) {
    send(create_router(Arc::clone(state)), "GET", uri).await
}

#[tokio::test]
async fn test_reads_before_first_load() {
    let state = state_with(banksville());

    let (status, _, _) = get(&state, "/transformers/locations").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = get(&state, "/transformers/locations/__count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0");

    let (status, _, body) = get(&state, "/transformers/locations/__ids").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let (status, _, _) = get(&state, "/__gtg").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_reload_trigger_rejected_before_initialisation() {
    let state = state_with(banksville());

    let (status, _, body) = send(
        create_router(Arc::clone(&state)),
        "POST",
        "/transformers/locations/__reload",
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["code"], "NOT_INITIALIZED");
    assert_eq!(state.store.status(), LoadStatus::Uninitialized);
}

#[tokio::test]
async fn test_list_single_location() {
    let state = state_with(banksville());
    state.store.reload().await.unwrap();

    let (status, content_type, body) = get(&state, "/transformers/locations").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(
        body,
        format!(r#"[{{"apiUrl":"http://localhost:8080/transformers/locations/{BANKSVILLE_UUID}"}}]"#)
    );
}

#[tokio::test]
async fn test_get_location_by_uuid() {
    let state = state_with(banksville());
    state.store.reload().await.unwrap();

    let (status, _, body) = get(&state, &format!("/transformers/locations/{BANKSVILLE_UUID}")).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["uuid"], BANKSVILLE_UUID);
    assert_eq!(json["prefLabel"], "Banksville, New York");
    assert_eq!(json["type"], "Location");
    assert_eq!(json["types"], serde_json::json!(["Thing", "Concept", "Location"]));
    assert_eq!(
        json["alternativeIdentifiers"]["TME"],
        serde_json::json!(["TnN0ZWluX0dMX1VTX05ZX011bmljaXBhbGl0eV85NDI5Njg=-R0w="])
    );
    assert_eq!(
        json["alternativeIdentifiers"]["uuids"],
        serde_json::json!([BANKSVILLE_UUID])
    );
}

#[tokio::test]
async fn test_get_unknown_or_invalid_uuid_is_not_found() {
    let state = state_with(banksville());
    state.store.reload().await.unwrap();

    let (status, _, _) = get(&state, "/transformers/locations/00000000-0000-0000-0000-000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&state, "/transformers/locations/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_count_ids_and_gtg_after_load() {
    let source = Arc::new(InMemorySource::new(vec![
        RawRecord::new(BANKSVILLE_ID, "Banksville, New York"),
        RawRecord::new("Nstein_GL_US_NY_Municipality_1", "Somewhere"),
    ]));
    let state = state_with(source);
    state.store.reload().await.unwrap();

    let (status, content_type, body) = get(&state, "/transformers/locations/__count").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(body, "2");

    let (status, content_type, body) = get(&state, "/transformers/locations/__ids").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l["id"] == BANKSVILLE_UUID));

    let (status, _, body) = get(&state, "/__gtg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_reload_trigger_accepted_then_conflict() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(
        InMemorySource::new(vec![RawRecord::new(BANKSVILLE_ID, "Banksville, New York")])
            .with_gate(Arc::clone(&gate)),
    );
    let state = state_with(source);

    gate.add_permits(1);
    state.store.reload().await.unwrap();
    gate.forget_permits(1);

    let (status, _, body) = send(
        create_router(Arc::clone(&state)),
        "POST",
        "/transformers/locations/__reload",
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, r#"{"message":"Reloading locations"}"#);
    assert_eq!(state.store.status(), LoadStatus::Loading);

    let (status, _, _) = send(
        create_router(Arc::clone(&state)),
        "POST",
        "/transformers/locations/__reload",
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Stale reads keep working while the reload waits on the gate.
    let (status, _, _) = get(&state, "/transformers/locations").await;
    assert_eq!(status, StatusCode::OK);

    gate.add_permits(1);
    for _ in 0..100 {
        if state.store.status() == LoadStatus::Ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.store.status(), LoadStatus::Ready);
    assert_eq!(state.store.generation(), 2);
}

#[tokio::test]
async fn test_cancel_reload_endpoint() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(
        InMemorySource::new(vec![RawRecord::new(BANKSVILLE_ID, "Banksville, New York")])
            .with_gate(Arc::clone(&gate)),
    );
    let state = state_with(source);

    gate.add_permits(1);
    state.store.reload().await.unwrap();
    gate.forget_permits(1);

    let (status, _, _) = send(
        create_router(Arc::clone(&state)),
        "DELETE",
        "/transformers/locations/__reload",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        create_router(Arc::clone(&state)),
        "POST",
        "/transformers/locations/__reload",
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _, _) = send(
        create_router(Arc::clone(&state)),
        "DELETE",
        "/transformers/locations/__reload",
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    for _ in 0..100 {
        if state.store.status() != LoadStatus::Loading {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.store.status(), LoadStatus::Ready);
    assert_eq!(state.store.generation(), 1);
    assert_eq!(state.store.count(), 1);
}

#[tokio::test]
async fn test_health_reports_failed_reload() {
    let source = banksville();
    let state = state_with(Arc::clone(&source));
    state.store.reload().await.unwrap();

    let (status, _, body) = get(&state, "/__health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["status"], "ready");
    assert_eq!(json["generation"], 1);

    source.fail_at(Some(0));
    assert!(state.store.reload().await.is_err());

    let (status, _, body) = get(&state, "/__health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["checks"][0]["checkOutput"], "Upstream returned status 500");

    // Previous snapshot still serves reads.
    let (status, _, body) = get(&state, "/transformers/locations/__count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1");
}

#[tokio::test]
async fn test_operational_endpoints() {
    let state = state_with(banksville());

    let (status, _, body) = get(&state, "/__ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");

    let (status, _, body) = get(&state, "/__build-info").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["name"], "locations-transformer");

    // No recorder installed on this state.
    let (status, _, _) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_end_to_end_against_mock_tme() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rs/authorityfiles/GL/terms"))
        .and(query_param("startRecord", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<taxonomy><term><name>Banksville, New York</name><id>{BANKSVILLE_ID}</id></term></taxonomy>"
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rs/authorityfiles/GL/terms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<taxonomy></taxonomy>"))
        .mount(&server)
        .await;

    let config = FetcherConfig::builder()
        .tme_base_url(server.uri())
        .base_url("http://test.example/transformers/locations/")
        .max_records(10)
        .slices(2)
        .build()
        .unwrap();
    let state = Arc::new(AppState::new(config).unwrap());
    let report = state.store.reload().await.unwrap();
    assert_eq!(report.entities, 1);

    let (status, _, body) = get(&state, "/transformers/locations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        format!(r#"[{{"apiUrl":"http://test.example/transformers/locations/{BANKSVILLE_UUID}"}}]"#)
    );
}
