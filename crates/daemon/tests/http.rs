//! Both routers driven in-process with an in-memory database

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use common::engine::{
    EvaluateRequest, EvaluateResponse, KeyedEngine, MetadataKind, DEFAULT_BUCKET_ID_BITS,
};
use common::ingest::{InsertReport, InsertRequest, Phase};
use leakcheck_daemon::http_server::{api_router, evaluate_router, WELCOME_TEXT};
use leakcheck_daemon::{ServiceConfig, ServiceState};

const BODY_LIMIT: usize = 1024 * 1024;

async fn routers() -> (Router, Router) {
    let state = ServiceState::from_config(&ServiceConfig::default())
        .await
        .unwrap();
    (evaluate_router(state.clone()), api_router(state))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn evaluate(router: &Router, username: &str, password: &str) -> Vec<MetadataKind> {
    let request =
        EvaluateRequest::for_credential(username.as_bytes(), password.as_bytes(), DEFAULT_BUCKET_ID_BITS);
    let (status, body) = send(
        router,
        post_json("/evaluate", serde_json::to_vec(&request).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response: EvaluateResponse = bincode::deserialize(&body).unwrap();
    response
        .evaluated
        .iter()
        .flat_map(|evaluated| KeyedEngine::open_bucket(evaluated, &response.bucket_contents).unwrap())
        .map(|entry| entry.kind)
        .collect()
}

#[tokio::test]
async fn index_serves_welcome_text() {
    let (evaluate, _) = routers().await;
    let (status, body) = send(&evaluate, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, WELCOME_TEXT.as_bytes());
}

#[tokio::test]
async fn config_describes_engine() {
    let (evaluate, _) = routers().await;
    let (status, body) = send(&evaluate, get("/config")).await;
    assert_eq!(status, StatusCode::OK);

    let config: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(config["bucket_id_bit_size"], DEFAULT_BUCKET_ID_BITS);
}

#[tokio::test]
async fn malformed_evaluate_is_bad_request() {
    let (evaluate, _) = routers().await;
    let (status, _) = send(&evaluate, post_json("/evaluate", b"not a request".to_vec())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn evaluate_unknown_credential_opens_nothing() {
    let (public, _) = routers().await;
    let request = EvaluateRequest::for_credential(b"nobody", b"secret", DEFAULT_BUCKET_ID_BITS);
    let response = public
        .clone()
        .oneshot(post_json("/evaluate", serde_json::to_vec(&request).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );

    assert!(evaluate(&public, "nobody", "secret").await.is_empty());
}

#[tokio::test]
async fn inserted_credential_is_found() {
    let (public, api) = routers().await;

    let mut insert = InsertRequest::new("alice", "hunter2", Phase::Breach);
    insert.include_username_variant = true;
    let (status, body) = send(
        &api,
        post_json("/api/v0/insert", serde_json::to_vec(&insert).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report: InsertReport = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.appended, 2);

    let kinds = evaluate(&public, "alice", "hunter2").await;
    assert!(kinds.contains(&MetadataKind::BreachedPassword));
    assert!(kinds.contains(&MetadataKind::BreachedUsername));

    // only the username entry opens for a different password
    let kinds = evaluate(&public, "alice", "other").await;
    assert_eq!(kinds, vec![MetadataKind::BreachedUsername]);
}

#[tokio::test]
async fn invalid_insert_is_bad_request() {
    let (_, api) = routers().await;
    let insert = InsertRequest::new(String::new(), "hunter2", Phase::Breach);
    let (status, body) = send(
        &api,
        post_json("/api/v0/insert", serde_json::to_vec(&insert).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(body["msg"].is_string());
}

#[tokio::test]
async fn external_generator_without_program_is_bad_request() {
    let (_, api) = routers().await;
    let mut insert = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    insert.use_external_generator = true;
    let (status, _) = send(
        &api,
        post_json("/api/v0/insert", serde_json::to_vec(&insert).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn routes_are_split_between_servers() {
    let (evaluate, api) = routers().await;

    let (status, _) = send(&evaluate, get("/api/v0/insert")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&api, get("/evaluate")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_routes_respond_on_both_servers() {
    let (evaluate, api) = routers().await;
    for router in [&evaluate, &api] {
        let (status, _) = send(router, get("/_status/livez")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(router, get("/_status/readyz")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
