use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::config::GeneratorConfig;
use crate::error::ProxyError;
use crate::stream::line_stream;

use super::StagedPrompt;

const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Builds and starts one generator process per request.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: String,
    args: Vec<String>,
    output_format: String,
    stderr_ignore_patterns: Arc<[String]>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
            output_format: config.output_format.clone(),
            stderr_ignore_patterns: config.stderr_ignore_patterns.clone().into(),
        }
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments passed after the binary: configured leading args, then the
    /// model and output-format flags.
    #[must_use]
    pub fn command_args(&self, model: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 4);
        args.extend(self.args.iter().cloned());
        args.push("--model".to_string());
        args.push(model.to_string());
        args.push("--output-format".to_string());
        args.push(self.output_format.clone());
        args
    }

    /// Start the generator with the staged prompt as its standard input.
    ///
    /// Standard error is drained on a separate task from the moment the
    /// process starts.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Spawn`] when the prompt file cannot be opened or
    /// the binary cannot be started.
    pub async fn spawn(&self, prompt: &StagedPrompt, model: &str) -> Result<GeneratorProcess, ProxyError> {
        let input = tokio::fs::File::open(prompt.path())
            .await
            .map_err(|e| {
                ProxyError::Spawn(format!(
                    "failed to open prompt file {}: {e}",
                    prompt.path().display()
                ))
            })?
            .into_std()
            .await;

        let mut child = Command::new(&self.binary)
            .args(self.command_args(model))
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProxyError::Spawn(format!("failed to start {}: {e}", self.binary)))?;

        let stdout = child.stdout.take();
        let stderr_task = child.stderr.take().map(|stderr| {
            let ignore = Arc::clone(&self.stderr_ignore_patterns);
            tokio::spawn(async move {
                let mut lines = std::pin::pin!(line_stream(stderr));
                while let Some(line) = lines.next().await {
                    if ignore.iter().any(|pattern| line.contains(pattern.as_str())) {
                        continue;
                    }
                    tracing::error!("[Gemini CLI Error] {line}");
                }
            })
        });

        tracing::debug!(binary = %self.binary, pid = child.id(), model, "[Process] spawned generator");

        Ok(GeneratorProcess {
            child,
            stdout,
            stderr_task,
        })
    }
}

/// A running generator and its output handles.
#[derive(Debug)]
pub struct GeneratorProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<()>>,
}

impl GeneratorProcess {
    /// Standard output; `None` after the first call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Ask the OS to terminate the process. Errors (already exited) are ignored.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "[Process] kill skipped");
        }
    }

    /// Wait for standard error to drain and the process to exit.
    ///
    /// Returns the exit code, or `None` when the process was ended by a
    /// signal or could not be waited on.
    pub async fn wait(mut self) -> Option<i32> {
        drop(self.stdout.take());
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::error!(error = %e, "[Process] failed to wait for generator");
                None
            }
        };
        if let Some(mut task) = self.stderr_task.take() {
            // A grandchild may still hold the pipe open after the process exits.
            match tokio::time::timeout(STDERR_DRAIN_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "[Process] stderr drain task failed"),
                Err(_) => task.abort(),
            }
        }
        code
    }
}
