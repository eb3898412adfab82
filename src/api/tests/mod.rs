use super::*;
use crate::reconciler::tests::{TestHarness, harness, harness_with};
use crate::types::{JobKind, Status};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Router over a fresh test harness
fn router_for(h: &TestHarness) -> Router {
    let engine = Arc::new(h.engine.clone());
    let config = Arc::new(h.engine.config().clone());
    create_router(engine, config)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let h = harness().await;
    let app = router_for(&h);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn callback_route_always_returns_200() {
    let h = harness().await;
    let app = router_for(&h);

    // Unknown shape, malformed body, and a real payload for a task that
    // does not exist: every one of them must be acknowledged
    for body in [
        json!({ "nonsense": true }),
        json!(null),
        json!({ "task_id": "never-seen", "callbackType": "complete", "data": [] }),
    ] {
        let response = router_for(&h)
            .oneshot(post_json("/callbacks/generation", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let ack = body_json(response).await;
        assert_eq!(ack["status"], "received");
    }

    // Even a non-JSON body acknowledges success
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/callbacks/generation")
                .header("content-type", "application/json")
                .body(Body::from("this is not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn callback_route_processes_real_payload() {
    let h = harness().await;
    let id = h.seed_task("task-http", JobKind::Music).await;
    h.serve_media("/t/h0.mp3", b"bytes").await;

    let response = router_for(&h)
        .oneshot(post_json(
            "/callbacks/generation",
            json!({
                "task_id": "task-http",
                "callbackType": "complete",
                "data": [ { "audioUrl": h.media_url("/t/h0.mp3") } ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ack = body_json(response).await;
    assert_eq!(ack["task_id"], "task-http");
    assert_eq!(ack["processed"], true);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
}

#[tokio::test]
async fn task_crud_roundtrip() {
    let h = harness().await;
    let id = h.seed_task("task-crud", JobKind::Music).await;

    // Get
    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .uri(format!("/tasks/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["provider_task_id"], "task-crud");
    assert_eq!(body["status"], "processing");

    // List
    let response = router_for(&h)
        .oneshot(Request::builder().uri("/tasks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Variants (empty)
    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .uri(format!("/tasks/{id}/variants"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body.as_array().unwrap().is_empty());

    // Delete, then 404
    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/tasks/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .uri(format!("/tasks/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn poll_route_returns_report_and_404_for_unknown() {
    let h = harness().await;
    h.seed_task("task-poll", JobKind::Music).await;
    h.provider_status("task-poll", json!({ "taskId": "task-poll", "status": "GENERATING" }))
        .await;

    let response = router_for(&h)
        .oneshot(post_json("/poll/task-poll", json!({ "persist_failure": false })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["status"], "processing");
    assert_eq!(report["provider_state"], "GENERATING");

    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/poll/never-seen")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_routes_require_credentials_when_configured() {
    let h = harness_with(|config| {
        config.api.api_key = Some("interactive-key".to_string());
        config.api.service_secret = Some("service-secret".to_string());
    })
    .await;
    h.seed_task("task-auth", JobKind::Music).await;
    h.provider_status("task-auth", json!({ "taskId": "task-auth", "status": "GENERATING" }))
        .await;

    // No credentials: 401
    let response = router_for(&h)
        .oneshot(Request::builder().uri("/tasks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Interactive caller passes
    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .uri("/tasks")
                .header("x-api-key", "interactive-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Trusted internal caller passes on the poll route
    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/poll/task-auth")
                .header("x-service-role", "true")
                .header("authorization", "Bearer service-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The callback stays public even with credentials configured
    let response = router_for(&h)
        .oneshot(post_json("/callbacks/generation", json!({ "unknown": true })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health stays public too
    let response = router_for(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn artifact_route_enforces_signed_token() {
    let h = harness().await;
    let id = h.seed_task("task-art", JobKind::Music).await;
    h.serve_media("/t/art.mp3", b"artifact-bytes").await;

    h.engine
        .handle_callback(json!({
            "task_id": "task-art",
            "callbackType": "complete",
            "data": [ { "audioUrl": h.media_url("/t/art.mp3") } ]
        }))
        .await;

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    let artifact_url = task.artifact_url.unwrap();

    // The stored reference works as-is
    let response = router_for(&h)
        .oneshot(Request::builder().uri(&artifact_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "audio/mpeg"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"artifact-bytes");

    // Tampering with the signature gets 403
    let tampered = artifact_url.replace("sig=", "sig=00");
    let response = router_for(&h)
        .oneshot(Request::builder().uri(&tampered).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A valid token for a missing file gets 404
    let missing = h.engine.vault().signed_url("owner-1/music/task-art/track_9.mp3");
    let response = router_for(&h)
        .oneshot(Request::builder().uri(&missing).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submit_route_creates_task() {
    let h = harness().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/generate"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "msg": "success",
            "data": { "taskId": "task-submitted" }
        })))
        .mount(&h.provider)
        .await;

    let response = router_for(&h)
        .oneshot(post_json(
            "/tasks",
            json!({
                "owner_id": "owner-1",
                "kind": "music",
                "title": "Summer Jingle",
                "params": { "prompt": "upbeat summer jingle" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["provider_task_id"], "task-submitted");
    assert_eq!(body["status"], "processing");
}

#[tokio::test]
async fn recover_route_sweeps_stale_tasks() {
    let h = harness().await;
    h.seed_task("task-stale", JobKind::Music).await;
    h.provider_status(
        "task-stale",
        json!({ "taskId": "task-stale", "status": "FAILED", "errorMessage": "expired" }),
    )
    .await;

    let response = router_for(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks/recover?min_age_secs=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let reports = body_json(response).await;
    assert_eq!(reports.as_array().unwrap().len(), 1);
    assert_eq!(reports[0]["status"], "failed");
}

#[tokio::test]
async fn cors_headers_present_when_enabled() {
    let h = harness().await;
    let app = router_for(&h);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers().contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}
