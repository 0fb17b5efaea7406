use super::{EncodeJob, Encoder};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Shells out to an `ffmpeg` binary, one invocation per job.
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    /// Locates `ffmpeg` on `PATH`.
    pub fn discover() -> Result<Self> {
        let program = which::which("ffmpeg")
            .context("ffmpeg not found on PATH; install it or use --dry-run")?;
        Ok(Self { program })
    }

    /// Uses an explicit binary path.
    #[must_use]
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<()> {
        debug!(
            input = %job.input.display(),
            output = %job.output.display(),
            args = ?job.args,
            "invoking ffmpeg"
        );

        let output = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(&job.input)
            .args(&job.args)
            .arg(&job.output)
            .output()
            .with_context(|| format!("failed to run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // ffmpeg front-loads banner noise; the failure reason is at the end.
            let diagnostic: String = stderr
                .lines()
                .rev()
                .take(6)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            bail!(
                "ffmpeg exited with {} encoding {}:\n{diagnostic}",
                output.status,
                job.output.display()
            );
        }
        Ok(())
    }
}
