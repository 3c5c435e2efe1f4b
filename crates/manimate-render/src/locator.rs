//! Discovery of rendered videos in the renderer's media tree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Quality, RenderError, RenderJob};

/// Bounded retry policy for waiting on the renderer's output file.
///
/// The first check happens immediately; `interval` is slept between
/// subsequent checks, for at most `max_attempts` checks in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPolicy {
    /// Delay between existence checks.
    #[serde(with = "millis", rename = "intervalMillis")]
    pub interval: Duration,
    /// Total number of existence checks.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    /// Creates a policy with the given interval and attempt count.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the time spent sleeping between checks.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Computes where the renderer writes its video and waits for it to appear.
///
/// The renderer lays out its media tree as
/// `<media_dir>/videos/<module>/<resolution>/<output_name>.mp4`, where
/// `<module>` is the stem of the scene source file.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    policy: PollPolicy,
}

impl Default for ArtifactLocator {
    fn default() -> Self {
        Self::new(PollPolicy::default())
    }
}

impl ArtifactLocator {
    /// Creates a locator using `policy`.
    #[must_use]
    pub const fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// The active poll policy.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Expected video path for the given naming inputs.
    #[must_use]
    pub fn expected_path(
        media_dir: &Path,
        module: &str,
        quality: Quality,
        output_name: &str,
    ) -> PathBuf {
        media_dir
            .join("videos")
            .join(module)
            .join(quality.resolution_dir())
            .join(format!("{output_name}.mp4"))
    }

    /// Expected video path for `job`.
    #[must_use]
    pub fn expected_path_for(job: &RenderJob) -> PathBuf {
        Self::expected_path(&job.media_dir, &job.module_name(), job.quality, &job.output_name)
    }

    /// Waits for the video produced by `job` to exist.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ArtifactNotFound`] if the file is still missing
    /// after the last attempt.
    pub async fn locate(&self, job: &RenderJob) -> Result<PathBuf, RenderError> {
        let path = Self::expected_path_for(job);
        self.wait_for(&path).await?;
        Ok(path)
    }

    /// Polls until `path` exists or the policy is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ArtifactNotFound`] if the file never appears.
    pub async fn wait_for(&self, path: &Path) -> Result<(), RenderError> {
        for attempt in 1..=self.policy.max_attempts {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                info!(path = %path.display(), attempt, "Rendered video located");
                return Ok(());
            }
            if attempt < self.policy.max_attempts {
                debug!(path = %path.display(), attempt, "Waiting for video file");
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        Err(RenderError::artifact_not_found(path, self.policy.window()))
    }
}
