use std::path::{Path, PathBuf};

use crate::error::ProxyError;

/// Writes prompts into the scratch directory for the generator to read.
#[derive(Debug, Clone)]
pub struct PromptStager {
    scratch_dir: PathBuf,
}

impl PromptStager {
    #[must_use]
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Write `prompt` to `prompt-<token>.txt`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Staging`] when the directory or file cannot be
    /// written. A partially written file is removed before returning.
    pub async fn stage(&self, prompt: &str, token: uuid::Uuid) -> Result<StagedPrompt, ProxyError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| {
                ProxyError::Staging(format!(
                    "failed to create scratch dir {}: {e}",
                    self.scratch_dir.display()
                ))
            })?;

        let staged = StagedPrompt {
            path: Some(self.scratch_dir.join(format!("prompt-{token}.txt"))),
        };
        if let Err(e) = tokio::fs::write(staged.path(), prompt.as_bytes()).await {
            let message = format!("failed to write {}: {e}", staged.path().display());
            staged.cleanup().await;
            return Err(ProxyError::Staging(message));
        }
        Ok(staged)
    }
}

/// A prompt file owned by one request.
///
/// [`StagedPrompt::cleanup`] removes the file; dropping an un-cleaned value
/// removes it synchronously as a last resort.
#[derive(Debug)]
pub struct StagedPrompt {
    path: Option<PathBuf>,
}

impl StagedPrompt {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Whether the file is still owned by this value.
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.path.is_some()
    }

    /// Delete the staged file. Safe to call more than once.
    ///
    /// Returns `true` when a file was removed by this call.
    pub async fn cleanup(mut self) -> bool {
        self.remove().await
    }

    async fn remove(&mut self) -> bool {
        let Some(path) = self.path.take() else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "[Staging] failed to remove prompt file");
                false
            }
        }
    }
}

impl Drop for StagedPrompt {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(path = %path.display(), error = %e, "[Staging] failed to remove prompt file");
                }
            }
        }
    }
}
