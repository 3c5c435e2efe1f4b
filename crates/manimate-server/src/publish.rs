//! Publishing rendered videos to the public directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// A rendered video and its published copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoArtifact {
    /// Location in the renderer's private media tree (retained).
    pub source_path: PathBuf,
    /// Location in the public directory.
    pub public_path: PathBuf,
    /// When the public copy was written.
    pub published_at: DateTime<Utc>,
}

/// Copies rendered videos into the public directory.
///
/// One video is kept per output name; publishing again under the same name
/// replaces the previous file.
#[derive(Debug, Clone)]
pub struct Publisher {
    public_dir: PathBuf,
}

impl Publisher {
    /// Creates a publisher writing into `public_dir`.
    #[must_use]
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
        }
    }

    /// Public path for `output_name`.
    #[must_use]
    pub fn public_path(&self, output_name: &str) -> PathBuf {
        self.public_dir.join(format!("{output_name}.mp4"))
    }

    /// Copies `rendered` to the public path for `output_name`.
    ///
    /// The copy is staged under a name unique to `work_token` and renamed
    /// into place, so readers never see a half-written video. Permissions and
    /// modification time are carried over.
    pub async fn publish(
        &self,
        rendered: &Path,
        output_name: &str,
        work_token: &str,
    ) -> Result<VideoArtifact> {
        tokio::fs::create_dir_all(&self.public_dir)
            .await
            .map_err(|e| PipelineError::filesystem("create public directory", &self.public_dir, e))?;

        let public_path = self.public_path(output_name);
        let staging = self.public_dir.join(format!(".{work_token}.mp4.partial"));

        tokio::fs::copy(rendered, &staging)
            .await
            .map_err(|e| PipelineError::filesystem("copy rendered video", rendered, e))?;
        if let Err(e) = copy_modified_time(rendered, &staging).await {
            debug!(error = %e, "Could not preserve modification time");
        }
        if let Err(e) = tokio::fs::rename(&staging, &public_path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(PipelineError::filesystem("publish video", &public_path, e));
        }

        info!(
            source = %rendered.display(),
            public = %public_path.display(),
            "Video published"
        );

        Ok(VideoArtifact {
            source_path: rendered.to_path_buf(),
            public_path,
            published_at: Utc::now(),
        })
    }

    /// Removes a transient source file. Failure is logged, never returned.
    pub async fn discard_source(&self, source: &Path) {
        match tokio::fs::remove_file(source).await {
            Ok(()) => debug!(path = %source.display(), "Generated source removed"),
            Err(e) => warn!(path = %source.display(), error = %e, "Failed to remove generated source"),
        }
    }
}

async fn copy_modified_time(from: &Path, to: &Path) -> std::io::Result<()> {
    let modified = tokio::fs::metadata(from).await?.modified()?;
    let to = to.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(to)?
            .set_modified(modified)
    })
    .await
    .map_err(std::io::Error::other)?
}
