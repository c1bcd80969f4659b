//! Web control surface.
//!
//! A small `axum` router served from its own thread on a private `tokio`
//! runtime, so the synchronous capture loop stays the process's main
//! thread. Handlers call into the shared `ModeController`; anything that
//! may touch the camera runs under `spawn_blocking` because a hardware
//! reconfiguration holds the mode lock for its full duration.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::constants::*;
use crate::controller::ModeController;
use crate::error::Error;
use crate::scheduler::SharedStatus;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ModeController>,
    pub status: SharedStatus,
    pub log_file: PathBuf,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Hardware(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Geolocation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Bus(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(json!({ "error": self.kind(), "message": self.to_string() }));
        (status, body).into_response()
    }
}

/// Start the server thread. Returns once the thread is spawned; the
/// server itself shuts down when `running` drops.
pub fn spawn_server(
    port: u16,
    state: AppState,
    running: Arc<AtomicBool>,
) -> anyhow::Result<std::thread::JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("web".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log_error!("Failed to build web runtime: {e}");
                    return;
                }
            };

            runtime.block_on(async move {
                let app = create_router(state);
                let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(l) => l,
                    Err(e) => {
                        log_error!("Web interface failed to bind port {port}: {e}");
                        return;
                    }
                };
                log_block_start!("Web interface listening on http://{addr}");

                let shutdown = async move {
                    while running.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                };

                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    log_error!("Web server error: {e}");
                }
            });
        })?;
    Ok(handle)
}

pub fn create_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/capture/start", post(capture_start))
        .route("/capture/stop", post(capture_stop))
        .route("/mode/preview", post(mode_preview))
        .route("/mode/capture", post(mode_capture))
        .route("/stream", get(stream))
        .route("/last_image", get(last_image))
        .route("/last_capture_time", get(last_capture_time))
        .route("/focus/set", post(focus_set))
        .route("/focus/auto", post(focus_auto))
        .route("/logs/latest", get(logs_latest))
        .route("/logs/recent", get(logs_recent))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.status.lock().unwrap().clone();
    let enabled = state.controller.enabled();
    let mode = state.controller.mode();
    let last = state
        .controller
        .last_capture()
        .map(|r| r.time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>heliocam</title></head><body>\
         <h1>heliocam</h1>\
         <p>Status: {}</p>\
         <p>Capture: {} &mdash; mode: {}</p>\
         <p>Last photo: {}</p>\
         <p><img src=\"/last_image\" alt=\"last capture\" width=\"640\"></p>\
         </body></html>",
        snapshot.status_message,
        if enabled { "enabled" } else { "disabled" },
        mode,
        last,
    ))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.status.lock().unwrap().clone();
    let last = state.controller.last_capture();

    Json(json!({
        "enabled": state.controller.enabled(),
        "mode": state.controller.mode().as_str(),
        "last_capture_time": last.as_ref().map(|r| r.time.to_rfc3339()),
        "last_capture_path": last.as_ref().map(|r| r.path.display().to_string()),
        "window_start": snapshot.window_start,
        "window_end": snapshot.window_end,
        "uptime_seconds": snapshot.uptime_seconds,
        "status_message": snapshot.status_message,
    }))
}

async fn capture_start(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.controller.enable_capture();
    Json(json!({ "enabled": true }))
}

async fn capture_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.controller.disable_capture();
    Json(json!({ "enabled": false }))
}

async fn mode_preview(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let controller = state.controller.clone();
    run_blocking(move || controller.enter_preview()).await?;
    Ok(Json(json!({ "mode": "preview" })))
}

async fn mode_capture(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let controller = state.controller.clone();
    run_blocking(move || controller.exit_preview()).await?;
    Ok(Json(json!({ "mode": "scheduled" })))
}

/// Live MJPEG stream. Enters preview mode if needed and serves frames
/// until the client disconnects; the preview session stays active
/// afterwards — `POST /mode/capture` hands the camera back to the
/// scheduler.
async fn stream(State(state): State<AppState>) -> Result<Response, Error> {
    let controller = state.controller.clone();
    run_blocking(move || controller.enter_preview()).await?;

    let controller = state.controller.clone();
    let frames = futures::stream::unfold(controller, |controller| async move {
        tokio::time::sleep(Duration::from_millis(STREAM_FRAME_INTERVAL_MS)).await;

        let grabber = controller.clone();
        let frame = tokio::task::spawn_blocking(move || grabber.preview_frame()).await;
        match frame {
            Ok(Ok(jpeg)) => {
                let mut part = Vec::with_capacity(jpeg.len() + 96);
                part.extend_from_slice(
                    format!(
                        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        jpeg.len()
                    )
                    .as_bytes(),
                );
                part.extend_from_slice(&jpeg);
                part.extend_from_slice(b"\r\n");
                Some((Ok::<_, std::convert::Infallible>(Bytes::from(part)), controller))
            }
            // Preview ended (scheduler reclaimed the camera) or the
            // frame grab failed: end the stream.
            _ => None,
        }
    });

    let response = Response::builder()
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .body(Body::from_stream(frames))
        .map_err(|e| Error::Hardware(format!("failed to build stream response: {e}")))?;
    Ok(response)
}

async fn last_image(State(state): State<AppState>) -> Response {
    let Some(record) = state.controller.last_capture() else {
        return (StatusCode::NOT_FOUND, "no capture yet").into_response();
    };

    match tokio::fs::read(&record.path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            format!("capture file unavailable: {e}"),
        )
            .into_response(),
    }
}

async fn last_capture_time(State(state): State<AppState>) -> Response {
    match state.controller.last_capture() {
        Some(record) => record.time.to_rfc3339().into_response(),
        None => (StatusCode::NOT_FOUND, "no capture yet").into_response(),
    }
}

#[derive(Deserialize)]
struct FocusRequest {
    value: u8,
}

async fn focus_set(
    State(state): State<AppState>,
    Json(request): Json<FocusRequest>,
) -> Response {
    if request.value > 100 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "validation",
                "message": format!("focus value {} out of range 0-100", request.value),
            })),
        )
            .into_response();
    }
    let controller = state.controller.clone();
    match run_blocking(move || controller.set_focus(request.value)).await {
        Ok(()) => Json(json!({ "focus": request.value })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn focus_auto(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let controller = state.controller.clone();
    run_blocking(move || controller.autofocus()).await?;
    Ok(Json(json!({ "focus": "auto" })))
}

async fn logs_latest(State(state): State<AppState>) -> Response {
    serve_log_tail(&state.log_file, LOGS_DEFAULT_LINES).await
}

#[derive(Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

async fn logs_recent(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let lines = query
        .lines
        .unwrap_or(LOGS_DEFAULT_LINES)
        .min(LOGS_MAX_LINES);
    serve_log_tail(&state.log_file, lines).await
}

async fn serve_log_tail(path: &PathBuf, lines: usize) -> Response {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let all: Vec<&str> = content.lines().collect();
            let tail = all[all.len().saturating_sub(lines)..].join("\n");
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], tail).into_response()
        }
        Err(e) => (
            StatusCode::NOT_FOUND,
            format!("log file unavailable: {e}"),
        )
            .into_response(),
    }
}

// Controller calls can hold the mode lock through a full hardware
// reconfiguration; keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> crate::error::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Hardware(format!("blocking task failed: {e}")))?
}
