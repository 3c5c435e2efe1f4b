//! Scene code synthesis.
//!
//! A [`CodeSynthesizer`] turns a free-text prompt into Manim source text.
//! Nothing here checks that the code is correct; the renderer finds out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::SynthesizerConfig;

/// Instructions sent ahead of every prompt.
const SCENE_INSTRUCTIONS: &str = "\
You write Python code for the Manim Community animation library.
Reply with one complete, runnable Python module and nothing else:
- start with `from manim import *`
- define exactly one class that subclasses `Scene` and implements `construct(self)`
- use only objects and methods that exist in Manim Community
- do not include explanations, comments about the code, or Markdown";

/// Errors returned by a code synthesizer.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// No API key was available.
    #[error("API key not configured: set the {var} environment variable")]
    MissingApiKey {
        /// Environment variable that was consulted.
        var: String,
    },

    /// The request could not be sent or the connection failed.
    #[error("request to code generation service failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("code generation service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body was not in the expected shape.
    #[error("failed to decode code generation response: {0}")]
    Decode(String),

    /// The service returned no code.
    #[error("code generation service returned no code")]
    EmptyResponse,
}

impl SynthesisError {
    /// Creates a new `Status` error.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

/// Turns a prompt into scene source text.
#[async_trait]
pub trait CodeSynthesizer: Send + Sync {
    /// Generates source text for `prompt`.
    ///
    /// `prompt` is already trimmed and non-empty.
    async fn synthesize(&self, prompt: &str) -> Result<String, SynthesisError>;
}

/// Synthesizer that always returns the same source.
///
/// Used to re-render an existing scene file without calling a model.
#[derive(Debug, Clone)]
pub struct FixedSynthesizer {
    source: String,
}

impl FixedSynthesizer {
    /// Creates a synthesizer returning `source` for every prompt.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[async_trait]
impl CodeSynthesizer for FixedSynthesizer {
    async fn synthesize(&self, _prompt: &str) -> Result<String, SynthesisError> {
        Ok(self.source.clone())
    }
}

/// Gemini `generateContent` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini `generateContent` response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Synthesizer backed by the Gemini API.
pub struct GeminiSynthesizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl std::fmt::Debug for GeminiSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSynthesizer")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiSynthesizer {
    /// Creates a synthesizer reading its API key from the environment
    /// variable named in `config`.
    pub fn from_env(config: &SynthesizerConfig) -> Result<Self, SynthesisError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| SynthesisError::MissingApiKey {
                var: config.api_key_env.clone(),
            })?;
        Self::with_api_key(config, api_key)
    }

    /// Creates a synthesizer with an explicit API key.
    pub fn with_api_key(
        config: &SynthesizerConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl CodeSynthesizer for GeminiSynthesizer {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn synthesize(&self, prompt: &str) -> Result<String, SynthesisError> {
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: SCENE_INSTRUCTIONS,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        debug!(endpoint = %self.endpoint(), "Requesting scene code");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::status(status.as_u16(), body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Decode(e.to_string()))?;

        let text: String = body
            .candidates
            .into_iter()
            .find_map(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        let code = strip_code_fences(&text);
        if code.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }

        info!(code_len = code.len(), "Scene code generated");
        Ok(code.to_string())
    }
}

/// Removes a surrounding Markdown code fence, if present.
///
/// Models often wrap code in a fence (with or without a language tag) even
/// when asked not to.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
