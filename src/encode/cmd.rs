use crate::encode::EncodeJob;
use std::io;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;

/// Seam over the external encoder binary so the pipeline can be exercised
/// without ffmpeg installed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FfmpegExecutor: Send + Sync {
    async fn run_encoder(&self, job: &EncodeJob) -> io::Result<Output>;
}

/// Runs the configured binary, resolved via PATH.
pub struct RealFfmpegExecutor {
    bin: String,
}

impl RealFfmpegExecutor {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl FfmpegExecutor for RealFfmpegExecutor {
    async fn run_encoder(&self, job: &EncodeJob) -> io::Result<Output> {
        let mut command = TokioCommand::new(&self.bin);
        command.args(job.args());
        // output() pipes both stdio streams and drains them concurrently
        // with the running child, so large diagnostics cannot deadlock on a
        // full pipe buffer.
        command.output().await
    }
}
