//! Environment configuration.

use std::env;
use std::path::PathBuf;

/// Maximum accepted upload body size. Enforced at the transport boundary,
/// before anything touches the disk.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory where uploaded images and generated videos are written
    pub output_dir: PathBuf,
    /// URL prefix under which the output directory is served
    pub public_prefix: String,
    /// Name (or path) of the encoder binary, resolved via PATH
    pub ffmpeg_bin: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            output_dir: env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| String::from("./videos"))
                .into(),
            public_prefix: env::var("PUBLIC_PREFIX").unwrap_or_else(|_| String::from("/videos")),
            ffmpeg_bin: env::var("FFMPEG_BIN").unwrap_or_else(|_| String::from("ffmpeg")),
        }
    }

    /// Relative URL at which a file in the output directory is retrievable.
    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), file_name)
    }
}
