//! Manim subprocess execution.
//!
//! This module provides [`RenderExecutor`], which runs the renderer for a
//! [`RenderJob`] with captured output and a hard wall-clock budget.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::{Quality, RenderError, RenderOutcome};

/// Default wall-clock budget for a single render.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything the renderer needs to render one scene.
///
/// # Example
///
/// ```
/// use manimate_render::{Quality, RenderJob};
///
/// let job = RenderJob::new("/tmp/generated/circle.py", "GrowingCircle")
///     .with_quality(Quality::Medium)
///     .with_output_name("circle_growth")
///     .with_media_dir("/tmp/output");
/// assert_eq!(job.output_name, "circle_growth");
/// ```
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Path to the scene source file.
    pub source: PathBuf,
    /// Scene class to render.
    pub scene: String,
    /// Resolution tier.
    pub quality: Quality,
    /// Base name (without extension) of the video file.
    pub output_name: String,
    /// Root of the renderer's media tree.
    pub media_dir: PathBuf,
}

impl RenderJob {
    /// Creates a job for `scene` in `source` with default quality.
    ///
    /// The output name defaults to the scene name and the media directory
    /// to `media`.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, scene: impl Into<String>) -> Self {
        let scene = scene.into();
        Self {
            source: source.into(),
            output_name: scene.clone(),
            scene,
            quality: Quality::default(),
            media_dir: PathBuf::from("media"),
        }
    }

    /// Sets the resolution tier.
    #[must_use]
    pub const fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Sets the base name of the produced video.
    #[must_use]
    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }

    /// Sets the root of the renderer's media tree.
    #[must_use]
    pub fn with_media_dir(mut self, media_dir: impl Into<PathBuf>) -> Self {
        self.media_dir = media_dir.into();
        self
    }

    /// File stem of the source, which the renderer uses to name its
    /// per-module output directory.
    #[must_use]
    pub fn module_name(&self) -> String {
        self.source
            .file_stem()
            .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned())
    }
}

/// Runs the renderer as an isolated subprocess.
#[derive(Debug, Clone)]
pub struct RenderExecutor {
    program: PathBuf,
    timeout: Duration,
    preview: bool,
}

impl Default for RenderExecutor {
    fn default() -> Self {
        Self::new("manim")
    }
}

impl RenderExecutor {
    /// Creates an executor for `program` with the default timeout.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_RENDER_TIMEOUT,
            preview: false,
        }
    }

    /// Sets the wall-clock budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Asks the renderer to open a preview once finished.
    #[must_use]
    pub const fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// The program this executor invokes.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The configured wall-clock budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the argument list for `job`.
    #[must_use]
    pub fn build_args(&self, job: &RenderJob) -> Vec<String> {
        vec![
            job.source.to_string_lossy().into_owned(),
            job.scene.clone(),
            job.quality.flag(self.preview).to_string(),
            "-o".to_string(),
            job.output_name.clone(),
            "--media_dir".to_string(),
            job.media_dir.to_string_lossy().into_owned(),
        ]
    }

    /// Runs the renderer for `job` and waits for it to exit.
    ///
    /// The budget covers both the process exit and draining its output, so
    /// a descendant that keeps the pipes open cannot stall the call. On unix
    /// the renderer leads its own process group and the whole group is
    /// killed when the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SpawnFailed`] if the program cannot be started,
    /// [`RenderError::Timeout`] if it outlives the budget (the process group
    /// is killed and the renderer reaped first), and [`RenderError::Failed`]
    /// with the captured output if it exits unsuccessfully.
    #[instrument(skip(self, job), fields(scene = %job.scene, quality = %job.quality))]
    pub async fn run(&self, job: &RenderJob) -> Result<RenderOutcome, RenderError> {
        let args = self.build_args(job);
        debug!(program = %self.program.display(), args = ?args, "Spawning renderer");

        let started = Instant::now();
        let deadline = started + self.timeout;

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            RenderError::spawn_failed(self.program.to_string_lossy(), e.to_string())
        })?;
        let pid = child.id();

        let mut stdout_task = spawn_capture(child.stdout.take());
        let mut stderr_task = spawn_capture(child.stderr.take());

        let status = match timeout_at(deadline, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f32(),
                    pid = ?pid,
                    "Renderer timed out, killing process group"
                );
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(RenderError::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        let drained = timeout_at(deadline, async {
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match drained {
            Ok(streams) => streams,
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f32(),
                    pid = ?pid,
                    "Renderer exited but its output stayed open, killing process group"
                );
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(RenderError::Timeout {
                    timeout: self.timeout,
                });
            }
        };
        let elapsed = started.elapsed();

        if !status.success() {
            warn!(
                exit_code = ?status.code(),
                elapsed_ms = elapsed.as_millis(),
                "Renderer exited unsuccessfully"
            );
            return Err(RenderError::failed(status.code(), stdout, stderr));
        }

        info!(elapsed_ms = elapsed.as_millis(), "Renderer finished");
        Ok(RenderOutcome {
            exit_code: status.code().unwrap_or_default(),
            stdout,
            stderr,
            elapsed,
        })
    }
}

/// Kills the renderer's process group, then the renderer itself, and reaps it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Renderer already gone");
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        warn!(pgid, "Process group id out of range");
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!(pgid, error = %e, "Failed to signal renderer process group");
    }
}

/// Drains a child pipe on its own task so a chatty renderer never blocks on
/// a full pipe buffer.
fn spawn_capture<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.read_to_end(&mut buf).await {
                debug!(error = %e, "Stopped reading renderer output");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
