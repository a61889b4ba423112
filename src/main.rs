use std::sync::Arc;

use stillreel::config::Config;
use stillreel::encode::{FfmpegExecutor, RealFfmpegExecutor};
use stillreel::server::{router, AppState};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt::init();

    let executor: Arc<dyn FfmpegExecutor> =
        Arc::new(RealFfmpegExecutor::new(config.ffmpeg_bin.clone()));
    let app = router(Arc::new(AppState {
        config: config.clone(),
        executor,
    }));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!(
        "Listening at {}:{}, serving videos from {}",
        config.addr,
        config.port,
        config.output_dir.display()
    );
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
