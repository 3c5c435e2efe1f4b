//! Integration tests for the HTTP API.
//!
//! Each test starts a real server on an ephemeral port and talks to it with
//! an HTTP client.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use manimate_render::PollPolicy;
use manimate_server::{
    create_router, AppState, Config, ErrorKind, ErrorReport, FixedSynthesizer,
    GenerationOutcome, RendererConfig, WELCOME_MESSAGE,
};
use serde_json::json;

const SCENE: &str =
    "from manim import *\n\nclass GrowingCircle(Scene):\n    def construct(self):\n        self.play(GrowFromCenter(Circle()))\n";

/// Renderer writing a video following the real media layout.
const RENDER_OK: &str = r#"stem=$(basename "$1" .py)
out="$7/videos/$stem/480p15"
mkdir -p "$out"
printf 'mp4:%s' "$2" > "$out/$5.mp4""#;

fn write_renderer(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-manim");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    let mut perms = std::fs::metadata(&path)
        .expect("Failed to stat script")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("Failed to chmod script");
    path
}

/// Spawns the server and returns its base URL.
async fn spawn_test_server(root: &Path, renderer_body: &str, timeout_seconds: u64) -> String {
    let program = write_renderer(root, renderer_body);
    let config = Config {
        generated_dir: root.join("generated").display().to_string(),
        output_dir: root.join("output").display().to_string(),
        public_dir: root.join("static").display().to_string(),
        renderer: RendererConfig {
            program: program.display().to_string(),
            timeout_seconds,
            preview: false,
        },
        poll: PollPolicy::new(Duration::from_millis(20), 5),
        ..Config::default()
    };
    config
        .ensure_directories()
        .await
        .expect("Failed to create directories");

    let router = create_router(AppState::new(config, Arc::new(FixedSynthesizer::new(SCENE))));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

async fn post_generate(base: &str, body: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/generate"))
        .json(&body)
        .send()
        .await
        .expect("Request failed")
}

#[tokio::test]
async fn test_root_and_health() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = spawn_test_server(dir.path(), RENDER_OK, 10).await;

    let root: serde_json::Value = reqwest::get(format!("{base}/"))
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(root["message"], WELCOME_MESSAGE);

    let health: serde_json::Value = reqwest::get(format!("{base}/health"))
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_generate_then_fetch_video() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = spawn_test_server(dir.path(), RENDER_OK, 10).await;

    let response = post_generate(
        &base,
        json!({
            "prompt": "Draw a circle and make it grow",
            "filename": "circle_growth",
            "quality": "l"
        }),
    )
    .await;
    assert_eq!(response.status(), 200);

    let outcome: GenerationOutcome = response.json().await.expect("Invalid JSON");
    assert_eq!(outcome.entry_point, "GrowingCircle");
    assert!(outcome.public_video_path.ends_with("static/circle_growth.mp4"));

    let video = reqwest::get(format!("{base}/static/circle_growth.mp4"))
        .await
        .expect("Request failed");
    assert_eq!(video.status(), 200);
    assert_eq!(video.text().await.expect("body"), "mp4:GrowingCircle");
}

#[tokio::test]
async fn test_renderer_defect_returns_422() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = spawn_test_server(
        dir.path(),
        "echo 'partial output'\necho 'ValueError: radius' >&2\nexit 2",
        10,
    )
    .await;

    let response = post_generate(
        &base,
        json!({ "prompt": "Draw a circle", "output_name": "circle" }),
    )
    .await;
    assert_eq!(response.status(), 422);

    let report: ErrorReport = response.json().await.expect("Invalid JSON");
    assert_eq!(report.kind, ErrorKind::RendererDefect);
    assert!(report.error.contains("STDOUT: partial output"));
    assert!(report.error.contains("STDERR: ValueError: radius"));
}

#[tokio::test]
async fn test_render_timeout_returns_504() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = spawn_test_server(dir.path(), "exec sleep 30", 1).await;

    let response = post_generate(
        &base,
        json!({ "prompt": "Draw a circle", "output_name": "circle" }),
    )
    .await;
    assert_eq!(response.status(), 504);

    let report: ErrorReport = response.json().await.expect("Invalid JSON");
    assert_eq!(report.kind, ErrorKind::Timeout);
    assert!(report.error.contains("timed out"));
}

#[tokio::test]
async fn test_missing_artifact_returns_500() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = spawn_test_server(dir.path(), "exit 0", 10).await;

    let response = post_generate(
        &base,
        json!({ "prompt": "Draw a circle", "output_name": "circle" }),
    )
    .await;
    assert_eq!(response.status(), 500);

    let report: ErrorReport = response.json().await.expect("Invalid JSON");
    assert_eq!(report.kind, ErrorKind::ServerError);
}

#[tokio::test]
async fn test_malformed_body_returns_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = spawn_test_server(dir.path(), RENDER_OK, 10).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/generate"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 400);

    let report: ErrorReport = response.json().await.expect("Invalid JSON");
    assert_eq!(report.kind, ErrorKind::ClientError);
}
