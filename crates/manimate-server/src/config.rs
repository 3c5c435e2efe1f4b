//! Configuration types for the Manimate service.
//!
//! Configuration is created once at startup, shared read-only by every
//! request, and names the directories that all requests write into.

use std::path::{Path, PathBuf};
use std::time::Duration;

use manimate_render::{PollPolicy, RenderExecutor};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "manimate.json";

/// Default directory for transient generated scene sources.
fn default_generated_dir() -> String {
    "temp/generated".to_string()
}

/// Default root of the renderer's media tree.
fn default_output_dir() -> String {
    "temp/output".to_string()
}

/// Default directory of published videos.
fn default_public_dir() -> String {
    "static".to_string()
}

fn default_renderer_program() -> String {
    "manim".to_string()
}

/// Default render budget in seconds.
const fn default_render_timeout() -> u64 {
    300
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

const fn default_request_timeout() -> u64 {
    120
}

const fn default_temperature() -> f32 {
    0.2
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8501".to_string(),
    ]
}

/// Main configuration for Manimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory where generated scene sources are written before rendering.
    #[serde(default = "default_generated_dir")]
    pub generated_dir: String,

    /// Root of the renderer's private media tree.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory holding one published video per output name.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    /// Renderer invocation settings.
    #[serde(default)]
    pub renderer: RendererConfig,

    /// How long to wait for the rendered video to appear.
    #[serde(default)]
    pub poll: PollPolicy,

    /// Code generation service settings.
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generated_dir: default_generated_dir(),
            output_dir: default_output_dir(),
            public_dir: default_public_dir(),
            renderer: RendererConfig::default(),
            poll: PollPolicy::default(),
            synthesizer: SynthesizerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `manimate.json` in the current directory. If not found,
    /// returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            PipelineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `manimate.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigParseError` if the file exists but
    /// cannot be read or parsed, and `PipelineError::ConfigValidationError`
    /// if the parsed values are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(PipelineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("generatedDir", &self.generated_dir),
            ("outputDir", &self.output_dir),
            ("publicDir", &self.public_dir),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::config_validation(
                    format!("{field} must not be empty"),
                    format!("Provide a directory path for {field} in your manimate.json"),
                ));
            }
        }

        if self.renderer.program.trim().is_empty() {
            return Err(PipelineError::config_validation(
                "renderer.program must not be empty",
                "Set renderer.program to the manim executable (e.g. \"manim\")",
            ));
        }

        if self.renderer.timeout_seconds == 0 {
            return Err(PipelineError::config_validation(
                "renderer.timeoutSeconds must be greater than 0",
                "Set renderer.timeoutSeconds to at least 1 second in your manimate.json",
            ));
        }

        if self.poll.max_attempts == 0 {
            return Err(PipelineError::config_validation(
                "poll.maxAttempts must be greater than 0",
                "Set poll.maxAttempts to at least 1 in your manimate.json",
            ));
        }

        if self.synthesizer.model.trim().is_empty() {
            return Err(PipelineError::config_validation(
                "synthesizer.model must not be empty",
                "Name a generative model, e.g. \"gemini-2.5-flash\"",
            ));
        }

        if self.synthesizer.request_timeout_seconds == 0 {
            return Err(PipelineError::config_validation(
                "synthesizer.requestTimeoutSeconds must be greater than 0",
                "Set synthesizer.requestTimeoutSeconds to at least 1 second in your manimate.json",
            ));
        }

        Ok(())
    }

    /// Directory for transient generated sources.
    #[must_use]
    pub fn generated_dir(&self) -> PathBuf {
        PathBuf::from(&self.generated_dir)
    }

    /// Root of the renderer's media tree.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    /// Directory of published videos.
    #[must_use]
    pub fn public_dir(&self) -> PathBuf {
        PathBuf::from(&self.public_dir)
    }

    /// Creates the generated, output and public directories if missing.
    ///
    /// Existing directories and their contents are left untouched.
    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [self.generated_dir(), self.output_dir(), self.public_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PipelineError::filesystem("create directory", &dir, e))?;
        }
        Ok(())
    }

    /// Builds the render executor described by this configuration.
    #[must_use]
    pub fn render_executor(&self) -> RenderExecutor {
        RenderExecutor::new(&self.renderer.program)
            .with_timeout(self.renderer.timeout())
            .with_preview(self.renderer.preview)
    }
}

/// Renderer invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererConfig {
    /// Path or name of the manim executable.
    #[serde(default = "default_renderer_program")]
    pub program: String,

    /// Wall-clock budget for one render, in seconds.
    #[serde(default = "default_render_timeout")]
    pub timeout_seconds: u64,

    /// Ask the renderer to open a preview of the finished video.
    #[serde(default)]
    pub preview: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: default_renderer_program(),
            timeout_seconds: default_render_timeout(),
            preview: false,
        }
    }
}

impl RendererConfig {
    /// Render budget as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Code generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizerConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the generative language API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_seconds: default_request_timeout(),
            temperature: default_temperature(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}
