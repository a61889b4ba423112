//! Invocation of the external encoder.
//!
//! The encoder is a black box characterized only by its exit code, its
//! stdio text, and whether the output file actually appeared on disk.

pub mod cmd;

pub use cmd::{FfmpegExecutor, RealFfmpegExecutor};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed output duration in seconds.
pub const VIDEO_DURATION_SECS: u32 = 10;
/// Pixel format chosen for broad player compatibility.
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const VIDEO_CODEC: &str = "libx264";
pub const OUTPUT_SCALE: &str = "scale=1280:720";

const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const OUTPUT_POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// One encoder invocation: loop a single input image into a fixed-duration
/// video. Created per request, never mutated.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl EncodeJob {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self { input, output }
    }

    /// Argument list passed to the encoder binary.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            OsString::from("-y"),
            OsString::from("-loop"),
            OsString::from("1"),
            OsString::from("-i"),
            self.input.clone().into_os_string(),
            OsString::from("-c:v"),
            OsString::from(VIDEO_CODEC),
            OsString::from("-t"),
            OsString::from(VIDEO_DURATION_SECS.to_string()),
            OsString::from("-pix_fmt"),
            OsString::from(PIXEL_FORMAT),
            OsString::from("-vf"),
            OsString::from(OUTPUT_SCALE),
            self.output.clone().into_os_string(),
        ]
    }
}

/// Classified result of one invocation. Never persisted.
#[derive(Debug)]
pub enum EncodeOutcome {
    /// Exit code zero and the output file is present on disk.
    Success {
        output: PathBuf,
        stdout: String,
        stderr: String,
    },
    /// Non-zero exit, or exit zero with no output file produced.
    Failure {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The process could not be started at all (binary missing, permissions).
    ProcessError { detail: String },
}

/// Run one encode job to completion and classify the result.
///
/// An exit code of zero is not sufficient for success: the output file must
/// also exist on disk before the job is reported as done.
pub async fn run_encode(executor: &dyn FfmpegExecutor, job: &EncodeJob) -> EncodeOutcome {
    tracing::info!(input = %job.input.display(), output = %job.output.display(), "running encoder");

    let output = match executor.run_encoder(job).await {
        Ok(output) => output,
        Err(err) => {
            return EncodeOutcome::ProcessError {
                detail: err.to_string(),
            }
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return EncodeOutcome::Failure {
            exit_code: output.status.code(),
            stderr,
        };
    }

    if !wait_for_output(&job.output).await {
        return EncodeOutcome::Failure {
            exit_code: Some(0),
            stderr: format!(
                "encoder exited successfully but produced no output file at {} within {:?}; stderr: {}",
                job.output.display(),
                OUTPUT_POLL_TIMEOUT,
                stderr
            ),
        };
    }

    EncodeOutcome::Success {
        output: job.output.clone(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr,
    }
}

/// Bounded poll for the output file after process exit. Filesystem visibility
/// can lag slightly; the cap keeps a missing file from being mistaken for lag.
async fn wait_for_output(path: &Path) -> bool {
    let deadline = tokio::time::Instant::now() + OUTPUT_POLL_TIMEOUT;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(OUTPUT_POLL_INTERVAL).await;
    }
}
