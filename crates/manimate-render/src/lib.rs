//! Manimate Render
//!
//! Runs the Manim command-line renderer as a subprocess and locates the
//! video it produces.
//!
//! This crate knows nothing about prompts or HTTP. It takes a scene source
//! file plus an entry point and turns them into a video file on disk, or a
//! [`RenderError`] describing why it could not.

pub mod executor;
pub mod locator;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use executor::{RenderExecutor, RenderJob, DEFAULT_RENDER_TIMEOUT};
pub use locator::{ArtifactLocator, PollPolicy};

/// Errors that can occur while rendering a scene.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer process could not be started.
    #[error("failed to start renderer '{program}': {message}")]
    SpawnFailed {
        /// Program that was invoked.
        program: String,
        /// Description of the spawn failure.
        message: String,
    },

    /// The renderer exceeded its wall-clock budget and was killed.
    #[error("Video generation timed out after {}s", .timeout.as_secs_f32())]
    Timeout {
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The renderer ran and exited unsuccessfully.
    ///
    /// Captured output is kept verbatim so the generated code can be debugged.
    #[error("Manim failed ({}):\nSTDERR: {stderr}\nSTDOUT: {stdout}", exit_label(.exit_code))]
    Failed {
        /// Exit code, `None` if the process was terminated by a signal.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The renderer reported success but its video never appeared.
    #[error("Rendered video not found at '{}' after waiting {:?}", .path.display(), .waited)]
    ArtifactNotFound {
        /// Where the video was expected.
        path: PathBuf,
        /// How long the locator waited in total.
        waited: Duration,
    },

    /// I/O error while supervising the renderer.
    #[error("renderer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {code}"),
    )
}

impl RenderError {
    /// Creates a new `SpawnFailed` error.
    #[must_use]
    pub fn spawn_failed(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Failed` error from captured process output.
    #[must_use]
    pub fn failed(exit_code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Failed {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Creates a new `ArtifactNotFound` error.
    #[must_use]
    pub fn artifact_not_found(path: impl Into<PathBuf>, waited: Duration) -> Self {
        Self::ArtifactNotFound {
            path: path.into(),
            waited,
        }
    }

    /// Returns `true` if the renderer itself rejected the scene.
    #[must_use]
    pub const fn is_scene_defect(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Coarse resolution and frame-rate tier passed to the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    /// 480p at 15 fps (default).
    #[default]
    Low,
    /// 720p at 30 fps.
    Medium,
    /// 1080p at 60 fps.
    High,
}

impl Quality {
    /// Parses a quality value, falling back to [`Quality::Low`] for anything
    /// unrecognized.
    ///
    /// Accepts the short forms `l`, `m`, `h` and the long forms `low`,
    /// `medium`, `high`, case-insensitively.
    ///
    /// # Examples
    ///
    /// ```
    /// use manimate_render::Quality;
    ///
    /// assert_eq!(Quality::from_str_lenient("H"), Quality::High);
    /// assert_eq!(Quality::from_str_lenient("ultra"), Quality::Low);
    /// ```
    #[must_use]
    pub fn from_str_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "m" | "medium" => Self::Medium,
            "h" | "high" => Self::High,
            _ => Self::Low,
        }
    }

    /// Short code used on the wire.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Low => "l",
            Self::Medium => "m",
            Self::High => "h",
        }
    }

    /// Renderer flag selecting this tier, optionally with the preview switch.
    #[must_use]
    pub const fn flag(&self, preview: bool) -> &'static str {
        match (self, preview) {
            (Self::Low, false) => "-ql",
            (Self::Medium, false) => "-qm",
            (Self::High, false) => "-qh",
            (Self::Low, true) => "-pql",
            (Self::Medium, true) => "-pqm",
            (Self::High, true) => "-pqh",
        }
    }

    /// Directory the renderer names after the output resolution and frame rate.
    #[must_use]
    pub const fn resolution_dir(&self) -> &'static str {
        match self {
            Self::Low => "480p15",
            Self::Medium => "720p30",
            Self::High => "1080p60",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str_lenient(&s))
    }
}

impl Serialize for Quality {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

/// Result of a renderer run that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock time the process ran for.
    pub elapsed: Duration,
}
