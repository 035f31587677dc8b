/// API integration tests
/// Tests complete HTTP request/response cycles against in-memory stores
mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use common::{create_test_app, TestApp, JOB_ID};
use mobility_core::{JobId, SyncStatus};
use std::time::Duration;
use tower::util::ServiceExt;

async fn json_body(response: Response) -> serde_json::Value {
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}

fn post(uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder().uri(uri).method("POST");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Poll the resolved status until it reaches `expected`
async fn wait_for_status(app: &TestApp, expected: SyncStatus) {
    let job_id = JobId::new(JOB_ID);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = app.manager.get_status(&job_id).await.unwrap().unwrap();
            if status.status == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for sync status");
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app(1).await;

    let response = app.router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_status_of_unknown_job() {
    let app = create_test_app(1).await;

    let response = app
        .router
        .oneshot(get("/api/jobs/missing/sync/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_status_before_any_run() {
    let app = create_test_app(1).await;

    let response = app
        .router
        .oneshot(get(&format!("/api/jobs/{JOB_ID}/sync/status")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "not_started");
    assert_eq!(body["progress"], 0);
}

#[tokio::test]
async fn test_start_sync_runs_to_completion() {
    let app = create_test_app(3).await;

    let response = app
        .router
        .clone()
        .oneshot(post(&format!("/api/jobs/{JOB_ID}/sync"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["job_id"], JOB_ID);
    assert!(!body["run_id"].as_str().unwrap().is_empty());

    wait_for_status(&app, SyncStatus::Completed).await;

    let response = app
        .router
        .oneshot(get(&format!("/api/jobs/{JOB_ID}/sync/status")))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["copied_objects"], 6);
    assert_eq!(
        app.objects
            .keys(common::MIRROR_BUCKET, &format!("jobs/{JOB_ID}/"))
            .await
            .len(),
        6
    );
}

#[tokio::test]
async fn test_start_sync_with_destination_override() {
    let app = create_test_app(2).await;

    let request = post(
        &format!("/api/jobs/{JOB_ID}/sync"),
        Some(serde_json::json!({ "destination": "s3://override/copies/" })),
    );
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    wait_for_status(&app, SyncStatus::Completed).await;

    assert_eq!(app.objects.keys("override", "copies/").await.len(), 4);
}

#[tokio::test]
async fn test_start_sync_of_unknown_job() {
    let app = create_test_app(1).await;

    let response = app
        .router
        .oneshot(post("/api/jobs/missing/sync", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.objects.copy_count(), 0);
}

#[tokio::test]
async fn test_start_sync_rejects_malformed_body() {
    let app = create_test_app(1).await;

    let request = Request::builder()
        .uri(format!("/api/jobs/{JOB_ID}/sync"))
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = post(
        &format!("/api/jobs/{JOB_ID}/sync"),
        Some(serde_json::json!({ "destination": "/no-bucket" })),
    );
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_without_running_sync() {
    let app = create_test_app(1).await;

    let response = app
        .router
        .oneshot(post(&format!("/api/jobs/{JOB_ID}/sync/cancel"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["cancelled"], false);
}

#[tokio::test]
async fn test_cancel_running_sync() {
    let app = create_test_app(5).await;
    app.objects.set_copy_delay(Duration::from_secs(30)).await;

    let response = app
        .router
        .clone()
        .oneshot(post(&format!("/api/jobs/{JOB_ID}/sync"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .router
        .clone()
        .oneshot(post(&format!("/api/jobs/{JOB_ID}/sync/cancel"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["cancelled"], true);

    wait_for_status(&app, SyncStatus::Cancelled).await;
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let app = create_test_app(1).await;

    let response = app
        .router
        .oneshot(post("/api/jobs/missing/sync/cancel", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
