//! # wscapture core
//!
//! Building blocks shared by the capture server: the error taxonomy, session
//! configuration, the JSON messages of the capture protocol, and the frame
//! sink that streams raw RGBA frames into an external encoder process.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
#[cfg(unix)]
pub mod encoder;
pub mod error;
pub mod protocol;
pub mod sink;

// Re-export main types
pub use config::{EncodeOptions, EncoderConfig, SessionConfig, BYTES_PER_PIXEL};
#[cfg(unix)]
pub use encoder::FfmpegEncoder;
pub use error::{CaptureError, ErrorKind};
pub use protocol::{BinaryMessage, ServerMessage};
pub use sink::FrameSink;
