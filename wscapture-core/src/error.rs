//! Error types for wscapture

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of a [`CaptureError`].
///
/// Every class is fatal to the session it occurs in; none of them is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client broke the framing rules (wrong type, wrong size, oversized message)
    Protocol,
    /// Deadline expiry, connection reset, or any other socket failure
    Transport,
    /// Output directory, output path or encoder process could not be acquired
    Resource,
    /// The frame sink failed while streaming or finalizing
    Sink,
    /// Invalid configuration supplied by the caller
    Configuration,
}

/// Main error type for wscapture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Configuration field that was rejected
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Output directory could not be created
    #[error("Could not create output directory {path:?}: {source}")]
    OutputDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Output file already exists
    #[error("File exists: {path:?}")]
    AlreadyExists {
        /// Path that is already taken
        path: PathBuf,
    },

    /// Output path could not be inspected
    #[error("Could not inspect output path {path:?}: {source}")]
    OutputPath {
        /// Path being inspected
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// OS pipe allocation failed
    #[error("Could not create encoder pipe: {source}")]
    PipeFailed {
        /// Underlying error
        source: std::io::Error,
    },

    /// Encoder process could not be started
    #[error("Could not start encoder {program:?}: {source}")]
    EncoderSpawnFailed {
        /// Program that failed to launch
        program: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The task opening a sink did not finish
    #[error("Sink open aborted: {reason}")]
    SinkOpenAborted {
        /// Why the task stopped
        reason: String,
    },

    /// Writing a frame to the encoder failed
    #[error("Encoder write failed: {source}")]
    SinkWrite {
        /// Underlying error
        source: std::io::Error,
    },

    /// The sink was used after it had been closed
    #[error("Frame sink is closed")]
    SinkClosed,

    /// Closing the write end of the encoder pipe failed
    #[error("Could not close encoder pipe: {source}")]
    PipeClose {
        /// Underlying error
        source: std::io::Error,
    },

    /// Waiting on the encoder process failed
    #[error("Could not wait for encoder: {source}")]
    EncoderWait {
        /// Underlying error
        source: std::io::Error,
    },

    /// Encoder process exited unsuccessfully
    #[error("Encoder exited with {status}")]
    EncoderExit {
        /// Exit status reported by the OS
        status: ExitStatus,
    },

    /// A non-binary data message was received
    #[error("Unexpected {kind} message")]
    UnexpectedMessage {
        /// Message type that was received
        kind: String,
    },

    /// A binary message had the wrong length
    #[error("Got {actual} bytes, expect {expected}")]
    FrameSizeMismatch {
        /// Exact frame size in bytes
        expected: usize,
        /// Received size in bytes
        actual: usize,
    },

    /// A message exceeded the per-message byte budget
    #[error("Message too large: {reason}")]
    MessageTooLarge {
        /// Description reported by the WebSocket layer
        reason: String,
    },

    /// Operation did not complete before its deadline
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline that expired
        duration: Duration,
    },

    /// The peer went away without a close handshake
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] tungstenite::Error),

    /// Message serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: String,
        /// Underlying error
        source: std::io::Error,
    },
}

impl From<tungstenite::Error> for CaptureError {
    fn from(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Capacity(e) => CaptureError::MessageTooLarge {
                reason: e.to_string(),
            },
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                CaptureError::ConnectionClosed
            }
            other => CaptureError::WebSocket(other),
        }
    }
}

impl CaptureError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            CaptureError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            CaptureError::OutputDirectory { .. } => "OUTPUT_DIRECTORY".to_string(),
            CaptureError::AlreadyExists { .. } => "ALREADY_EXISTS".to_string(),
            CaptureError::OutputPath { .. } => "OUTPUT_PATH".to_string(),
            CaptureError::PipeFailed { .. } => "PIPE_FAILED".to_string(),
            CaptureError::EncoderSpawnFailed { .. } => "ENCODER_SPAWN_FAILED".to_string(),
            CaptureError::SinkOpenAborted { .. } => "SINK_OPEN_ABORTED".to_string(),
            CaptureError::SinkWrite { .. } => "SINK_WRITE".to_string(),
            CaptureError::SinkClosed => "SINK_CLOSED".to_string(),
            CaptureError::PipeClose { .. } => "PIPE_CLOSE".to_string(),
            CaptureError::EncoderWait { .. } => "ENCODER_WAIT".to_string(),
            CaptureError::EncoderExit { .. } => "ENCODER_EXIT".to_string(),
            CaptureError::UnexpectedMessage { .. } => "UNEXPECTED_MESSAGE".to_string(),
            CaptureError::FrameSizeMismatch { .. } => "FRAME_SIZE_MISMATCH".to_string(),
            CaptureError::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE".to_string(),
            CaptureError::Timeout { .. } => "TIMEOUT".to_string(),
            CaptureError::ConnectionClosed => "CONNECTION_CLOSED".to_string(),
            CaptureError::WebSocket(_) => "WEBSOCKET_ERROR".to_string(),
            CaptureError::Serialization(_) => "SERIALIZATION_FAILED".to_string(),
            CaptureError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::UnexpectedMessage { .. }
            | CaptureError::FrameSizeMismatch { .. }
            | CaptureError::MessageTooLarge { .. } => ErrorKind::Protocol,
            CaptureError::Timeout { .. }
            | CaptureError::ConnectionClosed
            | CaptureError::WebSocket(_)
            | CaptureError::Serialization(_) => ErrorKind::Transport,
            CaptureError::OutputDirectory { .. }
            | CaptureError::AlreadyExists { .. }
            | CaptureError::OutputPath { .. }
            | CaptureError::PipeFailed { .. }
            | CaptureError::EncoderSpawnFailed { .. }
            | CaptureError::SinkOpenAborted { .. }
            | CaptureError::ServerStartFailed { .. } => ErrorKind::Resource,
            CaptureError::SinkWrite { .. }
            | CaptureError::SinkClosed
            | CaptureError::PipeClose { .. }
            | CaptureError::EncoderWait { .. }
            | CaptureError::EncoderExit { .. } => ErrorKind::Sink,
            CaptureError::InvalidConfiguration { .. } => ErrorKind::Configuration,
        }
    }

    /// Whether the client broke the framing rules
    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }
}
