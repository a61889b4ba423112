//! Stillreel - image-to-video conversion service
//!
//! Pipeline, leaf-first:
//! - storage: collision-free naming, upload persistence, write verification
//! - encode: external ffmpeg invocation behind a mockable executor seam
//! - server: HTTP routing, the pipeline handler, outcome-to-response mapping
//! - config: environment configuration (injected output directory)

pub mod config;
pub mod encode;
pub mod error;
pub mod server;
pub mod storage;
