//! HTTP API Integration Tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use helpers::{set_setting, Harness, AUDIO};
use turan_hw::api::USER_ID_HEADER;
use turan_hw::build_router;

fn app(h: &Harness) -> Router {
    build_router(h.assembly.state.clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_pipeline_state() {
    let h = Harness::new(vec![]).await;
    h.submitted().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["module"], "turan-hw");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["scoring"]["queue_open"], true);
    assert_eq!(body["scoring"]["queue_depth"], 1);
    assert_eq!(body["scoring"]["awaiting_scoring"], 1);
    assert_eq!(body["scoring"]["awaiting_review"], 0);
    // Background tasks are not started by the harness
    assert_eq!(body["scheduler_started"], false);
}

#[tokio::test]
async fn test_missing_or_unknown_caller_is_unauthorized() {
    let h = Harness::new(vec![]).await;
    let homework_id = h.assign().await;
    let uri = format!("/homeworks/{}", homework_id);

    let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(app(&h), get(&uri, Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_teacher_assigns_lesson_homework() {
    let h = Harness::new(vec![]).await;
    let uri = format!("/lessons/{}/homework", h.classroom.lesson);

    let (status, body) = send(app(&h), post_empty(&uri, h.classroom.teacher)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"].as_array().unwrap().len(), 2);

    let (status, _) = send(app(&h), post_empty(&uri, h.classroom.other_teacher)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_and_view_homework() {
    let h = Harness::new(vec![]).await;
    let homework_id = h.assign().await;
    let student = h.classroom.students[0];

    let request = Request::builder()
        .method("POST")
        .uri(format!("/homeworks/{}/submit", homework_id))
        .header(USER_ID_HEADER, student.to_string())
        .header("content-type", "audio/ogg")
        .body(Body::from(AUDIO))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "submitted");

    let uri = format!("/homeworks/{}", homework_id);
    let (status, body) = send(app(&h), get(&uri, student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], homework_id.to_string());

    // Another student cannot see it
    let (status, _) = send(app(&h), get(&uri, h.classroom.students[1])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_upload_is_unprocessable() {
    let h = Harness::new(vec![]).await;
    let homework_id = h.assign().await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/homeworks/{}/submit", homework_id))
        .header(USER_ID_HEADER, h.classroom.students[0].to_string())
        .header("content-type", "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_student_cannot_review() {
    let h = Harness::new(vec![helpers::Step::Fail]).await;
    let homework_id = h.submitted().await;
    h.assembly.worker.process(homework_id).await.unwrap();

    let uri = format!("/homeworks/{}/review", homework_id);
    let review = json!({ "status": "approved", "feedback": "self-approved" });

    let (status, body) = send(app(&h), post_json(&uri, h.classroom.students[0], review.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(app(&h), post_json(&uri, h.classroom.teacher, review)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["coins_awarded"], 10);
}

#[tokio::test]
async fn test_coin_endpoints_enforce_access() {
    let h = Harness::new(vec![]).await;
    let student = h.classroom.students[0];
    let coins_uri = format!("/students/{}/coins", student);

    let (status, body) = send(app(&h), get(&coins_uri, student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, _) = send(app(&h), get(&coins_uri, h.classroom.students[1])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        app(&h),
        get(&format!("/students/{}/transactions", student), h.classroom.admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["transactions"].as_array().unwrap().is_empty());

    let debit_uri = format!("/students/{}/coins/debit", student);
    let debit = json!({ "amount": 15, "reason": "Book" });

    let (status, _) = send(app(&h), post_json(&debit_uri, student, debit.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(&h), post_json(&debit_uri, h.classroom.admin, debit)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");
}

#[tokio::test]
async fn test_leaderboard_recompute_and_read() {
    let h = Harness::new(vec![]).await;
    let group = h.classroom.group;

    let (status, body) = send(
        app(&h),
        post_empty(&format!("/groups/{}/leaderboard/recompute", group), h.classroom.teacher),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        app(&h),
        get(&format!("/groups/{}/leaderboard", group), h.classroom.students[0]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"][0]["rank"], 1);
}

#[tokio::test]
async fn test_settings_reload_is_admin_only_and_applies() {
    let h = Harness::new(vec![]).await;

    let (status, _) = send(app(&h), post_empty("/settings/reload", h.classroom.teacher)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    set_setting(&h.classroom.pool, "homework_approved_coins", "25").await;
    let (status, body) = send(app(&h), post_empty("/settings/reload", h.classroom.admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["homework_approved_coins"], 25);
    assert_eq!(h.assembly.state.settings.current().homework_approved_coins, 25);

    // An invalid table keeps the previous snapshot
    set_setting(&h.classroom.pool, "similarity_threshold", "1.5").await;
    let (status, _) = send(app(&h), post_empty("/settings/reload", h.classroom.admin)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.assembly.state.settings.current().similarity_threshold, 0.5);
}

fn submit_audio(homework_id: Uuid, student: Uuid, audio: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/homeworks/{}/submit", homework_id))
        .header(USER_ID_HEADER, student.to_string())
        .header("content-type", "audio/wav")
        .body(Body::from(audio))
        .unwrap()
}

#[tokio::test]
async fn test_upload_limit_follows_settings_reload() {
    let h = Harness::with_settings(vec![], &[("max_audio_file_size_mb", "1")]).await;
    let homework_id = h.assign().await;
    let student = h.classroom.students[0];
    let router = app(&h);
    let audio = vec![7u8; 3 * 1024 * 1024];

    let (status, body) = send(
        router.clone(),
        submit_audio(homework_id, student, audio.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Same router, raised limit
    set_setting(&h.classroom.pool, "max_audio_file_size_mb", "10").await;
    let (status, _) = send(router.clone(), post_empty("/settings/reload", h.classroom.admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router, submit_audio(homework_id, student, audio)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "submitted");
}
