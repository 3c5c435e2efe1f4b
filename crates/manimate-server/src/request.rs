//! Generation requests and their validation.

use manimate_render::Quality;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Longest accepted output name, in bytes after sanitizing.
///
/// The name is embedded in the work token and in several file names, so it
/// must leave room under the usual 255-byte file name limit.
pub const MAX_OUTPUT_NAME_LEN: usize = 128;

/// A request to turn a prompt into a published video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Natural-language description of the animation.
    pub prompt: String,

    /// Name of the published video, without extension.
    #[serde(alias = "filename")]
    pub output_name: String,

    /// Resolution tier; unrecognized values mean low.
    #[serde(default)]
    pub quality: Quality,
}

impl GenerationRequest {
    /// Creates a low-quality request.
    #[must_use]
    pub fn new(prompt: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            output_name: output_name.into(),
            quality: Quality::default(),
        }
    }

    /// Sets the resolution tier.
    #[must_use]
    pub const fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Trims the prompt, sanitizes the output name and assigns a work token.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPrompt`] for a blank prompt and
    /// [`PipelineError::InvalidOutputName`] when no usable name remains or
    /// the name is longer than [`MAX_OUTPUT_NAME_LEN`].
    pub fn validate(self) -> Result<ValidatedRequest> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }

        let output_name = sanitize_output_name(&self.output_name).ok_or_else(|| {
            PipelineError::invalid_output_name(&self.output_name, "use letters, digits, '-' or '_'")
        })?;
        if output_name.len() > MAX_OUTPUT_NAME_LEN {
            return Err(PipelineError::invalid_output_name(
                &self.output_name,
                format!("must be at most {MAX_OUTPUT_NAME_LEN} characters"),
            ));
        }
        let work_token = format!("{output_name}_{}", Uuid::new_v4().simple());

        Ok(ValidatedRequest {
            prompt: prompt.to_string(),
            output_name,
            quality: self.quality,
            work_token,
        })
    }
}

/// A request whose fields are safe to use in paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Trimmed, non-empty prompt.
    pub prompt: String,
    /// Filesystem-safe output name.
    pub output_name: String,
    /// Resolution tier.
    pub quality: Quality,
    /// Unique per-request token naming the generated source and the
    /// renderer's private output directory.
    pub work_token: String,
}

/// Reduces `name` to a filesystem-safe token.
///
/// Whitespace runs become a single `_`, and any character other than ASCII
/// letters, digits, `-` and `_` is replaced with `_`. Returns `None` when the
/// result has no letter or digit.
///
/// # Examples
///
/// ```
/// use manimate_server::sanitize_output_name;
///
/// assert_eq!(sanitize_output_name(" circle growth ").as_deref(), Some("circle_growth"));
/// assert_eq!(sanitize_output_name("../etc/passwd").as_deref(), Some("___etc_passwd"));
/// assert_eq!(sanitize_output_name("   "), None);
/// ```
#[must_use]
pub fn sanitize_output_name(name: &str) -> Option<String> {
    let joined = name.split_whitespace().collect::<Vec<_>>().join("_");
    let sanitized: String = joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    sanitized
        .chars()
        .any(|c| c.is_ascii_alphanumeric())
        .then_some(sanitized)
}
