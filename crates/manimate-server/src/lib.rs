//! Manimate Server
//!
//! Turns natural-language prompts into rendered Manim videos and serves them
//! over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod publish;
pub mod request;
pub mod synth;

pub use api::{create_router, AppState, HealthResponse, WelcomeResponse, WELCOME_MESSAGE};
pub use config::{Config, RendererConfig, ServerConfig, SynthesizerConfig};
pub use error::{ErrorKind, ErrorReport, PipelineError, Result};
pub use extract::{extract_scene_class, find_scene_class};
pub use pipeline::{GenerationOutcome, Pipeline, SourceArtifact, SUCCESS_MESSAGE};
pub use publish::{Publisher, VideoArtifact};
pub use request::{
    sanitize_output_name, GenerationRequest, ValidatedRequest, MAX_OUTPUT_NAME_LEN,
};
pub use synth::{
    strip_code_fences, CodeSynthesizer, FixedSynthesizer, GeminiSynthesizer, SynthesisError,
};
