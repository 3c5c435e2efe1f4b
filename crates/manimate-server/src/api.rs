//! HTTP API for the Manimate service.
//!
//! # Endpoints
//!
//! - `GET /` - Welcome message
//! - `GET /health` - Liveness check
//! - `POST /generate` - Turn a prompt into a published video
//! - `GET /static/<name>.mp4` - Published videos
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use manimate_server::{create_router, AppState, Config, GeminiSynthesizer};
//!
//! # async fn example() {
//! let config = Config::default();
//! let synthesizer = GeminiSynthesizer::from_env(&config.synthesizer).unwrap();
//! let router = create_router(AppState::new(config, Arc::new(synthesizer)));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ErrorReport, PipelineError};
use crate::pipeline::{GenerationOutcome, Pipeline};
use crate::request::GenerationRequest;
use crate::synth::CodeSynthesizer;

/// Greeting returned by `GET /`.
pub const WELCOME_MESSAGE: &str = "Welcome to the Manim Animation Generator!";

// ============================================================================
// Response Types
// ============================================================================

/// Response body for `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeResponse {
    /// Greeting text.
    pub message: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is accepting requests.
    pub status: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Startup configuration, shared read-only.
    pub config: Arc<Config>,
    /// The generation pipeline.
    pub pipeline: Pipeline,
}

impl AppState {
    /// Creates state around `config`, generating code with `synthesizer`.
    #[must_use]
    pub fn new(config: Config, synthesizer: Arc<dyn CodeSynthesizer>) -> Self {
        let config = Arc::new(config);
        Self {
            pipeline: Pipeline::new(Arc::clone(&config), synthesizer),
            config,
        }
    }
}

// ============================================================================
// Error Responses
// ============================================================================

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from(&self);
        let status = StatusCode::from_u16(report.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(report)).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints.
///
/// Published videos are served from the configured public directory under
/// `/static`. CORS allows the configured origins, or any origin when none
/// are configured.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(&state.config.server.cors_origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(state.config.public_dir());

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/generate", post(handle_generate))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

fn allow_origin(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return AllowOrigin::any();
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: WELCOME_MESSAGE.to_string(),
    })
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Handler for `POST /generate`.
///
/// Malformed bodies are reported in the same shape as pipeline failures.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationOutcome>, PipelineError> {
    let Json(request) = body.map_err(|rejection| {
        let err = PipelineError::invalid_request(rejection.body_text());
        err.log();
        err
    })?;

    info!(
        output_name = %request.output_name,
        quality = %request.quality,
        prompt_len = request.prompt.len(),
        "Received generation request"
    );

    state.pipeline.generate(request).await.map(Json)
}
