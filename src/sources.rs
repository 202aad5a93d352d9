//! Frame sources used by the scheduler.
//!
//! | Kind | Type | Notes |
//! |------|------|-------|
//! | `command` | [`CommandSource`] | Runs an external grabber (`grim -`, `import -window root png:-`, ...) and decodes its stdout |
//! | `screen` | `ScreenSource` | Direct monitor capture; requires the `screen-capture` feature |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use screen_context_core::{CaptureError, CaptureSource, Frame};
use tokio::process::Command;
use tracing::debug;

use crate::config::SourceConfig;

/// Build the source selected by `[capture.source]`.
pub fn build_source(config: &SourceConfig) -> anyhow::Result<Arc<dyn CaptureSource>> {
    match config {
        SourceConfig::Command {
            command,
            timeout_secs,
        } => Ok(Arc::new(CommandSource::new(
            command.clone(),
            Duration::from_secs(*timeout_secs),
        )?)),
        #[cfg(feature = "screen-capture")]
        SourceConfig::Screen { monitor } => Ok(Arc::new(ScreenSource::new(*monitor))),
        #[cfg(not(feature = "screen-capture"))]
        SourceConfig::Screen { .. } => anyhow::bail!(
            "capture.source kind 'screen' requires building with the `screen-capture` feature"
        ),
    }
}

/// Runs a program that prints an encoded screenshot to stdout.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    /// A program still running after `timeout` is killed and the capture
    /// fails as a source error.
    pub fn new(argv: Vec<String>, timeout: Duration) -> anyhow::Result<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("capture command must name a program"))?;
        Ok(Self {
            program,
            args: argv.collect(),
            timeout,
        })
    }
}

#[async_trait]
impl CaptureSource for CommandSource {
    fn name(&self) -> &str {
        "command"
    }

    async fn capture(&self) -> Result<Frame, CaptureError> {
        let run = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                CaptureError::source_failed(format!(
                    "{} timed out after {:?}",
                    self.program, self.timeout
                ))
            })?
            .map_err(|e| CaptureError::source_failed(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::source_failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::source_failed(format!(
                "{} produced no image data",
                self.program
            )));
        }

        let captured_at = Utc::now();
        debug!(program = %self.program, bytes = output.stdout.len(), "command capture finished");

        Frame::decode(&output.stdout, captured_at)
            .map_err(|e| CaptureError::source_failed(format!("{}: {}", self.program, e)))
    }
}

#[cfg(feature = "screen-capture")]
pub use screen::ScreenSource;

#[cfg(feature = "screen-capture")]
mod screen {
    use super::*;
    use xcap::Monitor;

    /// Grabs one monitor through the platform capture API.
    #[derive(Debug, Clone)]
    pub struct ScreenSource {
        monitor: usize,
    }

    impl ScreenSource {
        pub fn new(monitor: usize) -> Self {
            Self { monitor }
        }
    }

    #[async_trait]
    impl CaptureSource for ScreenSource {
        fn name(&self) -> &str {
            "screen"
        }

        async fn capture(&self) -> Result<Frame, CaptureError> {
            let index = self.monitor;
            let grabbed = tokio::task::spawn_blocking(move || {
                let monitors = Monitor::all()
                    .map_err(|e| CaptureError::source_failed(format!("failed to list monitors: {}", e)))?;
                let monitor = monitors.get(index).ok_or_else(|| {
                    CaptureError::source_failed(format!(
                        "monitor {} not found ({} available)",
                        index,
                        monitors.len()
                    ))
                })?;
                let image = monitor
                    .capture_image()
                    .map_err(|e| CaptureError::source_failed(format!("screen capture failed: {}", e)))?;
                Ok::<_, CaptureError>((image.width(), image.height(), image.into_raw()))
            })
            .await
            .map_err(|e| CaptureError::source_failed(format!("capture task failed: {}", e)))?;

            let (width, height, raw) = grabbed?;
            Frame::from_rgba(width, height, raw, Utc::now())
        }
    }
}
