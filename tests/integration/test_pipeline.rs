//! End-to-end tests for the prompt-to-video pipeline.
//!
//! The real renderer is replaced by small shell scripts that honor the same
//! command line and media layout, so these tests run without Manim installed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use manimate_render::{PollPolicy, Quality, RenderError};
use manimate_server::{
    Config, ErrorKind, ErrorReport, FixedSynthesizer, GenerationRequest, Pipeline, PipelineError,
    RendererConfig, SUCCESS_MESSAGE,
};

const CIRCLE_PROMPT: &str = "Draw a circle and make it grow";

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn circle_scene() -> String {
    std::fs::read_to_string(fixture_path().join("circle_growth.py"))
        .expect("Failed to read scene fixture")
}

/// Writes an executable script standing in for the renderer.
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

/// A renderer that records its arguments and writes a video named after the
/// source module, following the real media layout.
fn recording_renderer(dir: &Path) -> (PathBuf, PathBuf) {
    let args_file = dir.join("renderer-args.txt");
    let body = format!(
        r#"printf '%s\n' "$@" > '{}'
stem=$(basename "$1" .py)
case "$3" in
  *qm) res=720p30 ;;
  *qh) res=1080p60 ;;
  *) res=480p15 ;;
esac
out="$7/videos/$stem/$res"
mkdir -p "$out"
printf '%s' "$stem" > "$out/$5.mp4""#,
        args_file.display()
    );
    (write_renderer(dir, &body), args_file)
}

fn test_config(root: &Path, program: &Path, timeout_seconds: u64) -> Config {
    Config {
        generated_dir: root.join("temp/generated").display().to_string(),
        output_dir: root.join("temp/output").display().to_string(),
        public_dir: root.join("static").display().to_string(),
        renderer: RendererConfig {
            program: program.display().to_string(),
            timeout_seconds,
            preview: false,
        },
        poll: PollPolicy::new(Duration::from_millis(20), 5),
        ..Config::default()
    }
}

fn pipeline_with(config: Config, source: impl Into<String>) -> Pipeline {
    Pipeline::new(Arc::new(config), Arc::new(FixedSynthesizer::new(source)))
}

fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}

/// Tests that the sample config fixture loads.
#[test]
fn test_sample_config_loads() {
    let config = Config::load_from_file(&fixture_path().join("manimate.json"))
        .expect("Failed to load config");

    assert_eq!(config.generated_dir, "work/generated");
    assert_eq!(config.public_dir, "public");
    assert_eq!(config.renderer.timeout_seconds, 120);
    assert_eq!(config.poll, PollPolicy::new(Duration::from_millis(500), 20));
    assert_eq!(config.server.host, "127.0.0.1");
}

/// Prompt, name and quality from the canonical example produce a published
/// video at the expected public path.
#[tokio::test]
async fn test_circle_growth_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (program, args_file) = recording_renderer(dir.path());
    let config = test_config(dir.path(), &program, 10);
    let pipeline = pipeline_with(config, circle_scene());

    let request = GenerationRequest::new(CIRCLE_PROMPT, "circle_growth").with_quality(Quality::Low);
    let outcome = pipeline.generate(request).await.expect("generation failed");

    let public = dir.path().join("static/circle_growth.mp4");
    assert_eq!(outcome.message, SUCCESS_MESSAGE);
    assert_eq!(outcome.entry_point, "GrowingCircle");
    assert_eq!(outcome.public_video_path, public.display().to_string());
    assert!(public.is_file());
    assert!(outcome.elapsed_seconds >= 0.0);

    let args: Vec<String> = std::fs::read_to_string(&args_file)
        .expect("renderer was not invoked")
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(args.len(), 7, "{args:?}");
    assert!(args[0].ends_with(".py"));
    assert!(Path::new(&args[0])
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with("circle_growth_")));
    let media_dir = dir.path().join("temp/output").display().to_string();
    assert_eq!(
        args[1..],
        [
            "GrowingCircle",
            "-ql",
            "-o",
            "circle_growth",
            "--media_dir",
            media_dir.as_str(),
        ]
    );

    // Private copy is retained, transient source is gone.
    let stem = Path::new(&args[0])
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .expect("source stem");
    assert!(dir
        .path()
        .join(format!("temp/output/videos/{stem}/480p15/circle_growth.mp4"))
        .is_file());
    assert!(dir_entries(&dir.path().join("temp/generated")).is_empty());
}

/// Source without a scene class is a client error and the renderer never runs.
#[tokio::test]
async fn test_no_scene_class_never_invokes_renderer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let marker = dir.path().join("renderer-ran");
    let program = write_renderer(dir.path(), &format!("touch '{}'", marker.display()));
    let pipeline = pipeline_with(
        test_config(dir.path(), &program, 10),
        "from manim import *\n\nclass Helper:\n    pass\n",
    );

    let err = pipeline
        .generate(GenerationRequest::new(CIRCLE_PROMPT, "circle_growth"))
        .await
        .expect_err("expected failure");

    assert_eq!(err.kind(), ErrorKind::ClientError);
    assert!(matches!(err, PipelineError::SceneNotFound { .. }), "{err:?}");
    assert!(!marker.exists(), "renderer must not be invoked");
    assert_eq!(dir_entries(&dir.path().join("temp/generated")).len(), 1);
}

/// A failing renderer's output reaches the caller verbatim.
#[tokio::test]
async fn test_renderer_failure_preserves_output_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let program = write_renderer(
        dir.path(),
        r#"printf 'Manim Community v0.18.1\n  rendering  GrowingCircle\n'
printf 'Traceback (most recent call last):\n  File "scene.py", line 6\nTypeError: bad <args> & "quotes"\n' >&2
exit 1"#,
    );
    let pipeline = pipeline_with(test_config(dir.path(), &program, 10), circle_scene());

    let err = pipeline
        .generate(GenerationRequest::new(CIRCLE_PROMPT, "circle_growth"))
        .await
        .expect_err("expected failure");

    let PipelineError::Render(RenderError::Failed {
        exit_code,
        ref stdout,
        ref stderr,
    }) = err
    else {
        unreachable!("expected renderer failure, got {err:?}");
    };
    assert_eq!(exit_code, Some(1));
    assert_eq!(stdout, "Manim Community v0.18.1\n  rendering  GrowingCircle\n");
    assert_eq!(
        stderr,
        "Traceback (most recent call last):\n  File \"scene.py\", line 6\nTypeError: bad <args> & \"quotes\"\n"
    );

    let report = ErrorReport::from(&err);
    assert_eq!(report.kind, ErrorKind::RendererDefect);
    assert!(report.error.contains(stdout.as_str()));
    assert!(report.error.contains(stderr.as_str()));

    // Nothing published; source left behind for inspection.
    assert!(dir_entries(&dir.path().join("static")).is_empty());
    assert_eq!(dir_entries(&dir.path().join("temp/generated")).len(), 1);
}

/// A renderer exceeding its budget is killed and reported as a timeout.
#[tokio::test]
async fn test_render_timeout_kills_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("renderer.pid");
    let program = write_renderer(
        dir.path(),
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );
    let pipeline = pipeline_with(test_config(dir.path(), &program, 1), circle_scene());

    let started = std::time::Instant::now();
    let err = pipeline
        .generate(GenerationRequest::new(CIRCLE_PROMPT, "circle_growth"))
        .await
        .expect_err("expected timeout");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(ErrorReport::from(&err).kind, ErrorKind::Timeout);

    let pid = std::fs::read_to_string(&pid_file).expect("pid file");
    let alive = std::process::Command::new("kill")
        .args(["-0", pid.trim()])
        .stderr(std::process::Stdio::null())
        .status()
        .expect("run kill")
        .success();
    assert!(!alive, "renderer process {} still running", pid.trim());
}

/// Unrecognized quality values fall back to the low flag.
#[tokio::test]
async fn test_unknown_quality_renders_low() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (program, args_file) = recording_renderer(dir.path());
    let pipeline = pipeline_with(test_config(dir.path(), &program, 10), circle_scene());

    let request: GenerationRequest = serde_json::from_value(serde_json::json!({
        "prompt": CIRCLE_PROMPT,
        "output_name": "circle_growth",
        "quality": "ultra"
    }))
    .expect("request should parse");
    pipeline.generate(request).await.expect("generation failed");

    let args = std::fs::read_to_string(&args_file).expect("renderer was not invoked");
    assert_eq!(args.lines().nth(2), Some("-ql"));
}

/// Exit code 0 without a video is a server error, not a renderer defect.
#[tokio::test]
async fn test_missing_artifact_is_server_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let program = write_renderer(dir.path(), "echo 'done'\nexit 0");
    let pipeline = pipeline_with(test_config(dir.path(), &program, 10), circle_scene());

    let err = pipeline
        .generate(GenerationRequest::new(CIRCLE_PROMPT, "circle_growth"))
        .await
        .expect_err("expected failure");

    assert_eq!(err.kind(), ErrorKind::ServerError);
    assert!(
        matches!(err, PipelineError::Render(RenderError::ArtifactNotFound { .. })),
        "{err:?}"
    );
    assert!(err.to_string().contains("Rendered video not found"));
}

/// Publishing the same name twice overwrites the earlier video.
#[tokio::test]
async fn test_repeat_request_overwrites_published_video() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (program, _) = recording_renderer(dir.path());
    let pipeline = pipeline_with(test_config(dir.path(), &program, 10), circle_scene());

    pipeline
        .generate(GenerationRequest::new(CIRCLE_PROMPT, "circle_growth"))
        .await
        .expect("first generation failed");
    let first = std::fs::read_to_string(dir.path().join("static/circle_growth.mp4"))
        .expect("first video");

    pipeline
        .generate(GenerationRequest::new(CIRCLE_PROMPT, "circle_growth"))
        .await
        .expect("second generation failed");
    let second = std::fs::read_to_string(dir.path().join("static/circle_growth.mp4"))
        .expect("second video");

    assert_ne!(first, second, "video should be replaced");
    assert_eq!(dir_entries(&dir.path().join("static")).len(), 1);
}

/// Concurrent requests for the same name do not share sources or renders.
#[tokio::test]
async fn test_concurrent_requests_same_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (program, _) = recording_renderer(dir.path());
    let pipeline = pipeline_with(test_config(dir.path(), &program, 10), circle_scene());

    let (a, b) = tokio::join!(
        pipeline.generate(GenerationRequest::new(CIRCLE_PROMPT, "shared")),
        pipeline.generate(GenerationRequest::new(CIRCLE_PROMPT, "shared")),
    );
    a.expect("first request failed");
    b.expect("second request failed");

    assert_eq!(dir_entries(&dir.path().join("static")).len(), 1);
    assert_eq!(dir_entries(&dir.path().join("temp/output/videos")).len(), 2);
}
