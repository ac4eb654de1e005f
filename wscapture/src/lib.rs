//! # wscapture
//!
//! Records frames rendered by a web page into video files. The page
//! connects over a WebSocket, receives the recording parameters, and
//! streams raw RGBA frames which are piped into an encoder process.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wscapture::{CaptureServer, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new(1280, 720, 30.0, 10.0, "videos")?;
//!     CaptureServer::new(config).start("localhost:8080").await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod logging;

// Re-export the building blocks
pub use wscapture_core::{
    CaptureError, EncodeOptions, EncoderConfig, ErrorKind, FrameSink, ServerMessage,
    SessionConfig,
};
#[cfg(unix)]
pub use wscapture_core::FfmpegEncoder;
pub use wscapture_server::{CaptureServer, EndReason, Session, SessionReport, SinkFactory};
#[cfg(unix)]
pub use wscapture_server::FfmpegSinkFactory;
