//! HTTP surface: the upload route, the pipeline handler, and the mapping of
//! pipeline outcomes onto responses.

use crate::config::{Config, MAX_UPLOAD_BYTES};
use crate::encode::{run_encode, EncodeJob, EncodeOutcome, FfmpegExecutor};
use crate::error::PipelineError;
use crate::storage;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::services::ServeDir;

pub struct AppState {
    pub config: Config,
    pub executor: Arc<dyn FfmpegExecutor>,
}

/// Success payload returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub message: String,
    pub video_url: String,
}

/// Build the application router: the convert endpoint plus a pass-through
/// file server over the output directory.
pub fn router(state: Arc<AppState>) -> Router {
    let serve_videos = ServeDir::new(&state.config.output_dir);
    let prefix = state.config.public_prefix.trim_end_matches('/').to_owned();

    Router::new()
        .route("/api/convert/upload", post(convert_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .nest_service(&prefix, serve_videos)
        .with_state(state)
}

/// Handler that accepts a multipart image upload and responds with the URL
/// of the generated video.
async fn convert_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    match convert_pipeline(&state, &mut multipart).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "upload pipeline failed");
            (err.status(), err.to_string()).into_response()
        }
    }
}

async fn convert_pipeline(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<Response, PipelineError> {
    while let Some(field) = multipart.next_field().await? {
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => continue,
        };

        let token = storage::RequestToken::next();
        let paths = storage::plan_paths(&state.config.output_dir, &file_name, &token).await?;

        let written = storage::stream_to_file(&paths.input, field).await?;
        let stored = storage::verify_stored(&paths.input, written).await?;
        tracing::info!(path = %stored.path.display(), bytes = stored.size, "stored upload");

        let job = EncodeJob::new(stored.path, paths.output);
        let outcome = run_encode(state.executor.as_ref(), &job).await;
        return Ok(outcome_to_response(&state.config, &paths.output_name, outcome));
    }

    // Every field lacked a filename: nothing was uploaded.
    Err(PipelineError::EmptyUpload)
}

fn outcome_to_response(config: &Config, output_name: &str, outcome: EncodeOutcome) -> Response {
    match outcome {
        EncodeOutcome::Success { output, .. } => {
            tracing::info!(output = %output.display(), "video generated");
            (
                StatusCode::OK,
                Json(ConvertResponse {
                    message: String::from("Video generated successfully!"),
                    video_url: config.public_url(output_name),
                }),
            )
                .into_response()
        }
        EncodeOutcome::Failure { exit_code, stderr } => {
            tracing::error!(?exit_code, stderr = %stderr, "encoder failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("FFmpeg failed: {}", stderr),
            )
                .into_response()
        }
        EncodeOutcome::ProcessError { detail } => {
            tracing::error!(detail = %detail, "encoder could not be started");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Exception: {}", detail),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::cmd::MockFfmpegExecutor;
    use axum::body::{Body, Bytes};
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::os::unix::process::ExitStatusExt;
    use std::path::Path;
    use std::process::{ExitStatus, Output};
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    const BOUNDARY: &str = "reel-test-boundary";

    fn test_state(dir: &TempDir, executor: MockFfmpegExecutor) -> Arc<AppState> {
        Arc::new(AppState {
            config: Config {
                addr: String::from("127.0.0.1"),
                port: String::from("0"),
                output_dir: dir.path().to_path_buf(),
                public_prefix: String::from("/videos"),
                ffmpeg_bin: String::from("ffmpeg"),
            },
            executor: Arc::new(executor),
        })
    }

    fn upload_request(file_name: Option<&str>, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file_name {
            Some(name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\r\n",
                    name
                )
                .as_bytes(),
            ),
            None => body
                .extend_from_slice(b"Content-Disposition: form-data; name=\"file\"\r\n\r\n"),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/convert/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn exit_zero() -> Output {
        Output {
            status: ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn empty_file_is_rejected_and_nothing_is_written() {
        let dir = tempdir().unwrap();
        let app = router(test_state(&dir, MockFfmpegExecutor::new()));

        let response = app
            .oneshot(upload_request(Some("photo.png"), b""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "No file uploaded.");
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn missing_file_field_is_rejected() {
        let dir = tempdir().unwrap();
        let app = router(test_state(&dir, MockFfmpegExecutor::new()));

        // A form field with no filename is not a file upload.
        let response = app.oneshot(upload_request(None, b"text")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_any_write() {
        let dir = tempdir().unwrap();
        let app = router(test_state(&dir, MockFfmpegExecutor::new()));

        // One byte over the limit, arriving as a single buffered body whose
        // length is known up front. The limit trips before the field is ever
        // read, so nothing reaches the disk.
        let content = vec![0u8; MAX_UPLOAD_BYTES + 1];
        let response = app
            .oneshot(upload_request(Some("huge.png"), &content))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn oversized_chunked_upload_is_rejected_mid_stream() {
        let dir = tempdir().unwrap();
        let app = router(test_state(&dir, MockFfmpegExecutor::new()));

        // No declared length: the limit can only trip while the field is
        // streaming to disk. The status must survive and the partial input
        // must be cleaned up.
        let head = Bytes::from(format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"huge.png\"\r\n\r\n",
            BOUNDARY
        ));
        let chunk = Bytes::from(vec![0u8; 1024 * 1024]);
        let chunks = std::iter::once(head)
            .chain(std::iter::repeat(chunk).take(21))
            .map(Ok::<_, std::io::Error>);

        let request = Request::builder()
            .method("POST")
            .uri("/api/convert/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn successful_encode_returns_the_artifact_url() {
        let dir = tempdir().unwrap();
        let mut executor = MockFfmpegExecutor::new();
        executor.expect_run_encoder().returning(|job| {
            std::fs::write(&job.output, b"mp4").unwrap();
            Ok(exit_zero())
        });
        let app = router(test_state(&dir, executor));

        let response = app
            .oneshot(upload_request(Some("photo.png"), b"not really a png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payload: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(payload["message"], "Video generated successfully!");

        let url = payload["videoUrl"].as_str().unwrap();
        let name = url.strip_prefix("/videos/").unwrap();
        assert!(name.starts_with("output_") && name.ends_with(".mp4"));
        // The URL must point at a file that exists on disk.
        assert!(dir.path().join(name).is_file());
    }

    #[tokio::test]
    async fn encoder_failure_surfaces_its_stderr() {
        let dir = tempdir().unwrap();
        let mut executor = MockFfmpegExecutor::new();
        executor.expect_run_encoder().returning(|_| {
            Ok(Output {
                // Raw wait status 256 is exit code 1.
                status: ExitStatus::from_raw(256),
                stdout: Vec::new(),
                stderr: b"Invalid data found when processing input".to_vec(),
            })
        });
        let app = router(test_state(&dir, executor));

        let response = app
            .oneshot(upload_request(Some("photo.png"), b"bytes"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_string(response).await;
        assert!(body.contains("Invalid data found when processing input"));
        assert!(!body.contains("videoUrl"));
    }

    #[tokio::test]
    async fn repeat_submissions_produce_independent_artifacts() {
        let dir = tempdir().unwrap();
        let mut executor = MockFfmpegExecutor::new();
        executor.expect_run_encoder().returning(|job| {
            std::fs::write(&job.output, b"mp4").unwrap();
            Ok(exit_zero())
        });
        let app = router(test_state(&dir, executor));

        let mut urls = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(upload_request(Some("same.png"), b"same bytes"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let payload: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            urls.push(payload["videoUrl"].as_str().unwrap().to_owned());
        }

        assert_ne!(urls[0], urls[1], "artifacts must never overwrite");
        for url in &urls {
            let name = url.strip_prefix("/videos/").unwrap();
            assert!(dir.path().join(name).is_file());
        }
    }
}
