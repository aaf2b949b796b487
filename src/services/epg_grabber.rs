//! External EPG grabber process

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::GrabberError;

/// Launches the configured grabber tool for one site
#[derive(Debug, Clone)]
pub struct EpgGrabber {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl EpgGrabber {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    /// Run the grabber and return its exit code.
    ///
    /// The process is killed if it outlives the timeout.
    pub async fn grab(
        &self,
        config: &Path,
        channels: &Path,
        output: &Path,
    ) -> Result<i32, GrabberError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("--config")
            .arg(config)
            .arg("--channels")
            .arg(channels)
            .arg("--output")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Running {} for {} -> {}",
            self.command,
            config.display(),
            output.display()
        );

        let result = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| GrabberError::Timeout {
                command: self.command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| GrabberError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let code = result.status.code().ok_or_else(|| GrabberError::Terminated {
            command: self.command.clone(),
        })?;
        if code != 0 {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(
                "{} exited with code {}: {}",
                self.command,
                code,
                stderr.trim()
            );
        }
        Ok(code)
    }
}
