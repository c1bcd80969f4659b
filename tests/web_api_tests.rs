//! Route-level tests for the web control surface, driven through the
//! router with `tower::ServiceExt::oneshot` and a mock camera behind the
//! controller.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use heliocam::camera::CameraProfile;
use heliocam::camera::mock::MockCamera;
use heliocam::config::Resolution;
use heliocam::controller::ModeController;
use heliocam::logger::Log;
use heliocam::persist::StateStore;
use heliocam::scheduler::DaemonStatus;
use heliocam::web::{AppState, create_router};

struct TestApp {
    router: Router,
    controller: Arc<ModeController>,
    dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    Log::set_enabled(false);
    let dir = tempfile::tempdir().unwrap();
    let (camera, _calls) = MockCamera::new();

    let controller = Arc::new(
        ModeController::new(
            Box::new(camera),
            CameraProfile::Still(Resolution {
                width: 1920,
                height: 1080,
            }),
            CameraProfile::Preview(Resolution {
                width: 640,
                height: 480,
            }),
            dir.path().join("photos"),
            StateStore::new(dir.path().join("state.json")),
        )
        .unwrap(),
    );

    let state = AppState {
        controller: controller.clone(),
        status: Arc::new(Mutex::new(DaemonStatus::default())),
        log_file: dir.path().join("heliocam.log"),
    };

    TestApp {
        router: create_router(state),
        controller,
        dir,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn post(router: &Router, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method("POST").uri(uri);
    let request = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(json.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn status_reports_scheduled_and_enabled() {
    let app = test_app();
    let (status, body) = get(&app.router, "/status").await;

    assert_eq!(status, StatusCode::OK);
    let value = json(&body);
    assert_eq!(value["enabled"], true);
    assert_eq!(value["mode"], "scheduled");
    assert!(value["last_capture_time"].is_null());
}

#[tokio::test]
async fn capture_toggle_round_trips() {
    let app = test_app();

    let (status, _) = post(&app.router, "/capture/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.controller.enabled());

    let (_, body) = get(&app.router, "/status").await;
    assert_eq!(json(&body)["enabled"], false);

    let (status, _) = post(&app.router, "/capture/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.controller.enabled());
}

#[tokio::test]
async fn preview_mode_round_trips() {
    let app = test_app();

    let (status, body) = post(&app.router, "/mode/preview", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["mode"], "preview");

    let (_, body) = get(&app.router, "/status").await;
    assert_eq!(json(&body)["mode"], "preview");

    let (status, body) = post(&app.router, "/mode/capture", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["mode"], "scheduled");
}

#[tokio::test]
async fn focus_value_is_validated() {
    let app = test_app();

    let (status, body) = post(&app.router, "/focus/set", Some(r#"{"value": 101}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "validation");

    let (status, body) = post(&app.router, "/focus/set", Some(r#"{"value": 50}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["focus"], 50);

    let (status, _) = post(&app.router, "/focus/auto", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn last_capture_routes_return_404_before_any_capture() {
    let app = test_app();

    let (status, _) = get(&app.router, "/last_image").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app.router, "/last_capture_time").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn last_capture_routes_serve_the_photo_after_capture() {
    let app = test_app();
    app.controller.capture_once().unwrap();

    let (status, body) = get(&app.router, "/last_image").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(&[0xFF, 0xD8]), "expected JPEG magic");

    let (status, body) = get(&app.router, "/last_capture_time").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(&text).is_ok());
}

#[tokio::test]
async fn log_routes_tail_the_log_file() {
    let app = test_app();
    let lines: Vec<String> = (1..=20).map(|i| format!("line {i}")).collect();
    std::fs::write(app.dir.path().join("heliocam.log"), lines.join("\n")).unwrap();

    let (status, body) = get(&app.router, "/logs/recent?lines=5").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.lines().count(), 5);
    assert!(text.ends_with("line 20"));

    let (status, _) = get(&app.router, "/logs/latest").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_log_file_is_a_404() {
    let app = test_app();
    let (status, _) = get(&app.router, "/logs/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn index_serves_html() {
    let app = test_app();
    let (status, body) = get(&app.router, "/").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("heliocam"));
}
