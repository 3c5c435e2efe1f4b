//! The prompt-to-video pipeline.
//!
//! Stages run strictly in order: synthesize, write source, extract the scene
//! class, render, locate the video, publish. The first failing stage ends the
//! request; nothing is retried and partial files are left where they are.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use manimate_render::{ArtifactLocator, RenderExecutor, RenderJob, RenderOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::extract::extract_scene_class;
use crate::publish::{Publisher, VideoArtifact};
use crate::request::{GenerationRequest, ValidatedRequest};
use crate::synth::CodeSynthesizer;

/// Message returned with every successful generation.
pub const SUCCESS_MESSAGE: &str = "Animation created";

/// Generated scene code written to disk for the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    /// Location of the source file.
    pub path: PathBuf,
    /// Source text as written.
    pub code: String,
}

/// Success payload of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// Fixed success message.
    pub message: String,
    /// Scene class that was rendered.
    pub entry_point: String,
    /// Where the published video lives.
    pub public_video_path: String,
    /// Total time spent on the request.
    pub elapsed_seconds: f64,
}

/// What a request produced before it is reported back.
struct Completed {
    entry_point: String,
    artifact: VideoArtifact,
    render: RenderOutcome,
}

/// Runs generation requests against shared configuration.
///
/// A `Pipeline` is cheap to clone and safe to share between concurrent
/// requests; each request works on its own source file and media subtree.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    synthesizer: Arc<dyn CodeSynthesizer>,
    executor: RenderExecutor,
    locator: ArtifactLocator,
    publisher: Publisher,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("locator", &self.locator)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline from configuration and a code synthesizer.
    #[must_use]
    pub fn new(config: Arc<Config>, synthesizer: Arc<dyn CodeSynthesizer>) -> Self {
        let executor = config.render_executor();
        let locator = ArtifactLocator::new(config.poll);
        let publisher = Publisher::new(config.public_dir());
        Self {
            config,
            synthesizer,
            executor,
            locator,
            publisher,
        }
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Turns `request` into a published video.
    ///
    /// Failures are logged here, once, before being returned.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] of the first stage that failed.
    #[instrument(skip(self, request), fields(output_name = %request.output_name, quality = %request.quality))]
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutcome> {
        let started = Instant::now();
        let result = self.run_stages(request).await;

        match result {
            Ok(Completed {
                entry_point,
                artifact,
                render,
            }) => {
                let elapsed_seconds = started.elapsed().as_secs_f64();
                info!(
                    entry_point = %entry_point,
                    public_path = %artifact.public_path.display(),
                    render_seconds = render.elapsed.as_secs_f64(),
                    elapsed_seconds,
                    "Animation created"
                );
                Ok(GenerationOutcome {
                    message: SUCCESS_MESSAGE.to_string(),
                    entry_point,
                    public_video_path: artifact.public_path.display().to_string(),
                    elapsed_seconds,
                })
            }
            Err(err) => {
                err.log();
                Err(err)
            }
        }
    }

    async fn run_stages(&self, request: GenerationRequest) -> Result<Completed> {
        let request = request.validate()?;
        debug!(work_token = %request.work_token, "Request validated");

        let code = self.synthesizer.synthesize(&request.prompt).await?;
        let source = self.write_source(&request, code).await?;

        let entry_point = extract_entry_point(&source.path).await?;
        info!(entry_point = %entry_point, source = %source.path.display(), "Scene class extracted");

        let job = RenderJob::new(&source.path, &entry_point)
            .with_quality(request.quality)
            .with_output_name(&request.output_name)
            .with_media_dir(self.config.output_dir());
        let render = self.executor.run(&job).await?;
        debug!(
            render_ms = render.elapsed.as_millis(),
            stdout = %render.stdout,
            stderr = %render.stderr,
            "Renderer output"
        );

        let rendered = self.locator.locate(&job).await?;
        let artifact = self
            .publisher
            .publish(&rendered, &request.output_name, &request.work_token)
            .await?;
        self.publisher.discard_source(&source.path).await;

        Ok(Completed {
            entry_point,
            artifact,
            render,
        })
    }

    /// Writes generated code to `<generated dir>/<work token>.py`.
    async fn write_source(&self, request: &ValidatedRequest, code: String) -> Result<SourceArtifact> {
        let dir = self.config.generated_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::filesystem("create generated directory", &dir, e))?;

        let path = dir.join(format!("{}.py", request.work_token));
        tokio::fs::write(&path, &code)
            .await
            .map_err(|e| PipelineError::filesystem("write generated source", &path, e))?;
        debug!(path = %path.display(), bytes = code.len(), "Generated source written");

        Ok(SourceArtifact { path, code })
    }
}

/// Reads the scene class back from the file the renderer will load.
async fn extract_entry_point(path: &Path) -> Result<String> {
    extract_scene_class(path)
        .await
        .map_err(|e| PipelineError::filesystem("read generated source", path, e))?
        .ok_or_else(|| PipelineError::scene_not_found(path))
}
