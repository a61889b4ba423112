use axum::http::StatusCode;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors produced by the upload-and-store half of the pipeline, before the
/// encoder is ever invoked. Encoder results are a separate tagged outcome
/// (`encode::EncodeOutcome`), not an error.
#[derive(Debug)]
pub enum PipelineError {
    /// No file field in the request, or a file field with zero bytes.
    EmptyUpload,
    /// The multipart body could not be read (malformed stream, body limit).
    Multipart(axum::extract::multipart::MultipartError),
    /// Filesystem failure while creating the output directory or writing.
    Io(io::Error),
    /// The input file is absent from disk after the write reported success.
    MissingAfterWrite(PathBuf),
    /// Size on disk does not match the number of bytes streamed.
    Incomplete {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::EmptyUpload => write!(f, "No file uploaded."),
            PipelineError::Multipart(e) => write!(f, "Failed to read upload: {}", e),
            PipelineError::Io(e) => write!(f, "Storage error: {}", e),
            PipelineError::MissingAfterWrite(path) => {
                write!(f, "Uploaded file missing after write: {}", path.display())
            }
            PipelineError::Incomplete {
                path,
                expected,
                actual,
            } => write!(
                f,
                "Incomplete write to {}: expected {} bytes, found {}",
                path.display(),
                expected,
                actual
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Multipart(e) => Some(e),
            PipelineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl From<axum::extract::multipart::MultipartError> for PipelineError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        PipelineError::Multipart(err)
    }
}

impl PipelineError {
    /// HTTP status this error maps to. Client input problems are 4xx,
    /// everything on our side of the boundary is a 500.
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::EmptyUpload => StatusCode::BAD_REQUEST,
            PipelineError::Multipart(e) => e.status(),
            PipelineError::Io(_)
            | PipelineError::MissingAfterWrite(_)
            | PipelineError::Incomplete { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_upload_is_a_client_error() {
        assert_eq!(PipelineError::EmptyUpload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(PipelineError::EmptyUpload.to_string(), "No file uploaded.");
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let missing = PipelineError::MissingAfterWrite(PathBuf::from("/tmp/x.png"));
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let incomplete = PipelineError::Incomplete {
            path: PathBuf::from("/tmp/x.png"),
            expected: 10,
            actual: 3,
        };
        assert_eq!(incomplete.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(incomplete.to_string().contains("expected 10 bytes"));
    }
}
