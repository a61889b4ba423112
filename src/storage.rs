//! Collision-free naming and upload persistence.
//!
//! Each request gets a unique token; the input image and the output video are
//! both named from it, so concurrent requests own disjoint paths and no
//! locking is needed anywhere in the pipeline.

use crate::error::PipelineError;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::BoxError;
use chrono::Local;
use futures::{Stream, StreamExt, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;

/// Process-wide counter appended to the timestamp. The timestamp alone has
/// second granularity, which is not unique under concurrent load.
static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-request discriminator embedded in every generated filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken(String);

impl RequestToken {
    pub fn next() -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let serial = TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);
        RequestToken(format!("{}_{}", timestamp, serial))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input and output paths for one request, both rooted in the output dir.
#[derive(Debug, Clone)]
pub struct StoredPaths {
    /// Where the uploaded image is written
    pub input: PathBuf,
    /// Where the encoder writes the video
    pub output: PathBuf,
    /// Bare filename of the video, for URL construction
    pub output_name: String,
}

/// A file confirmed to exist on disk with a known size.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Derive the input/output paths for a request and make sure the output
/// directory exists. Directory creation races safely across requests.
pub async fn plan_paths(
    root: &Path,
    original_name: &str,
    token: &RequestToken,
) -> io::Result<StoredPaths> {
    tokio::fs::create_dir_all(root).await?;

    let ext = sanitized_extension(original_name);
    let output_name = format!("output_{}.mp4", token);
    Ok(StoredPaths {
        input: root.join(format!("input_{}.{}", token, ext)),
        output: root.join(&output_name),
        output_name,
    })
}

/// Extension of the client-supplied filename, kept only if it is plain
/// alphanumeric. The rest of the name is discarded entirely.
fn sanitized_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| String::from("img"))
}

/// Stream an upload body to `path` without buffering it in memory.
///
/// The first chunk is awaited before the file is created, so an empty upload
/// is rejected with no write attempted and nothing left on disk. Returns the
/// number of bytes streamed.
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> Result<u64, PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let stream = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    futures::pin_mut!(stream);

    let first = loop {
        match stream.next().await {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => break chunk,
            Some(Err(err)) => return Err(stream_error(err)),
            None => return Err(PipelineError::EmptyUpload),
        }
    };

    let mut file = BufWriter::new(File::create(path).await?);

    let written = async {
        file.write_all(&first).await?;
        let mut body_reader = StreamReader::new(stream);
        let copied = tokio::io::copy(&mut body_reader, &mut file)
            .await
            .map_err(stream_error)?;
        file.flush().await?;
        Ok::<_, PipelineError>(first.len() as u64 + copied)
    }
    .await;

    match written {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            // The file was created but the body never finished arriving.
            let _ = tokio::fs::remove_file(path).await;
            Err(err)
        }
    }
}

/// A stream error may be a transport-level multipart failure (malformed part,
/// body over the size limit) rather than a disk problem. Recover it from the
/// `io::Error` wrapper so its HTTP status survives the trip.
fn stream_error(err: io::Error) -> PipelineError {
    match err.downcast::<MultipartError>() {
        Ok(multipart) => PipelineError::Multipart(multipart),
        Err(err) => PipelineError::Io(err),
    }
}

/// Re-read the file's size from storage and compare against the number of
/// bytes streamed. A truncated input fed to the encoder would produce
/// plausible-looking but wrong output, so this is a correctness check.
pub async fn verify_stored(path: &Path, expected: u64) -> Result<StoredFile, PipelineError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PipelineError::MissingAfterWrite(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.len() != expected {
        return Err(PipelineError::Incomplete {
            path: path.to_path_buf(),
            expected,
            actual: metadata.len(),
        });
    }

    Ok(StoredFile {
        path: path.to_path_buf(),
        size: metadata.len(),
    })
}
