//! Error types for the Manimate pipeline.
//!
//! Every failure in the generation-to-render chain ends up as a
//! [`PipelineError`]. Its [`ErrorKind`] tells the caller whether to rephrase
//! the prompt, retry, or escalate, and [`ErrorReport`] is the uniform payload
//! returned over HTTP and printed by the CLI.

use std::path::PathBuf;

use manimate_render::RenderError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::synth::SynthesisError;

/// A specialized `Result` type for Manimate pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while turning a prompt into a published video.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your manimate.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The request body could not be understood.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what was wrong with the body.
        message: String,
    },

    /// The prompt was empty after trimming.
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// The output name is unusable after sanitizing.
    #[error("Invalid output name '{name}': {reason}")]
    InvalidOutputName {
        /// The name as submitted.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// The generated source declares no renderable scene.
    #[error("Scene class not found in generated code '{}'", .path.display())]
    SceneNotFound {
        /// Path to the generated source file.
        path: PathBuf,
    },

    // ========================================================================
    // Stage Errors
    // ========================================================================
    /// The generative code service failed.
    #[error("Code generation failed")]
    Synthesis(#[from] SynthesisError),

    /// The renderer failed, timed out, or produced no video.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A filesystem operation failed.
    #[error("Failed to {action} '{}'", .path.display())]
    Filesystem {
        /// What the pipeline was trying to do.
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or unusable input; rephrase and resubmit.
    ClientError,
    /// The render exceeded its time budget.
    Timeout,
    /// The generated code failed to render.
    RendererDefect,
    /// Infrastructure or environment failure.
    ServerError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientError => write!(f, "client_error"),
            Self::Timeout => write!(f, "timeout"),
            Self::RendererDefect => write!(f, "renderer_defect"),
            Self::ServerError => write!(f, "server_error"),
        }
    }
}

impl ErrorKind {
    /// HTTP status code for this classification.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ClientError => 400,
            Self::RendererDefect => 422,
            Self::ServerError => 500,
            Self::Timeout => 504,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ClientError => "Check the request fields or rephrase the prompt",
            Self::Timeout => "Simplify the animation or retry when the server is less busy",
            Self::RendererDefect => {
                "The generated scene failed to render; rephrase the prompt and try again"
            }
            Self::ServerError => "Retry later; if the problem persists check the server logs",
        }
    }
}

impl PipelineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidOutputName` error.
    #[must_use]
    pub fn invalid_output_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOutputName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `SceneNotFound` error.
    #[must_use]
    pub fn scene_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SceneNotFound { path: path.into() }
    }

    /// Creates a new `Filesystem` error.
    #[must_use]
    pub fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// Classifies this error for the caller.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. }
            | Self::EmptyPrompt
            | Self::InvalidOutputName { .. }
            | Self::SceneNotFound { .. } => ErrorKind::ClientError,
            Self::Render(RenderError::Timeout { .. }) => ErrorKind::Timeout,
            Self::Render(e) if e.is_scene_defect() => ErrorKind::RendererDefect,
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::Synthesis(_)
            | Self::Render(_)
            | Self::Filesystem { .. } => ErrorKind::ServerError,
        }
    }

    /// Nested cause worth showing to the caller, if the message omits it.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Synthesis(inner) => Some(inner.to_string()),
            Self::Filesystem { source, .. } => Some(source.to_string()),
            _ => None,
        }
    }

    /// Logs this error once, at a level matching its classification.
    pub fn log(&self) {
        let kind = self.kind();
        match kind {
            ErrorKind::ClientError | ErrorKind::RendererDefect => {
                warn!(kind = %kind, error = %self, detail = ?self.detail(), "Generation request failed");
            }
            ErrorKind::Timeout | ErrorKind::ServerError => {
                error!(kind = %kind, error = %self, detail = ?self.detail(), "Generation request failed");
            }
        }
    }
}

/// Structured error payload returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Human-readable message; may span several lines of renderer output.
    pub error: String,
    /// Nested cause, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Failure classification.
    pub kind: ErrorKind,
    /// What the caller can do about it.
    pub suggestion: String,
}

impl From<&PipelineError> for ErrorReport {
    fn from(err: &PipelineError) -> Self {
        let kind = err.kind();
        Self {
            error: err.to_string(),
            detail: err.detail(),
            kind,
            suggestion: kind.suggestion().to_string(),
        }
    }
}
