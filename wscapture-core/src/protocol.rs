//! Capture protocol messages

use crate::config::SessionConfig;
use crate::error::CaptureError;
use serde::{Deserialize, Serialize};

/// Messages sent from the server to the capturing page, one JSON object each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Session handshake, always the first message
    Start {
        /// Frame width in pixels
        width: u32,
        /// Frame height in pixels
        height: u32,
        /// Frames per second
        framerate: f64,
        /// Target frame count, or -1 when unbounded
        length: i64,
    },
    /// Latest frame count accepted by the server
    Ack {
        /// Frame count
        frame: u64,
    },
}

impl ServerMessage {
    /// Build the start message for a session
    pub fn start(config: &SessionConfig) -> Self {
        ServerMessage::Start {
            width: config.width,
            height: config.height,
            framerate: config.framerate,
            length: config.start_length(),
        }
    }

    /// Build an acknowledgment
    pub fn ack(frame: u64) -> Self {
        ServerMessage::Ack { frame }
    }

    /// Encode as a JSON text payload
    pub fn to_json(&self) -> Result<String, CaptureError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Meaning of a binary message, judged by its length alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMessage {
    /// Zero-length message: the client has finished
    EndOfStream,
    /// A complete frame
    Frame,
}

impl BinaryMessage {
    /// Classify a binary message of `len` bytes against the exact frame size
    pub fn classify(len: usize, frame_byte_size: usize) -> Result<Self, CaptureError> {
        match len {
            0 => Ok(BinaryMessage::EndOfStream),
            n if n == frame_byte_size => Ok(BinaryMessage::Frame),
            n => Err(CaptureError::FrameSizeMismatch {
                expected: frame_byte_size,
                actual: n,
            }),
        }
    }
}
