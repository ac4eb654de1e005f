//! Shared helpers for session and server tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;
use wscapture_core::{CaptureError, FrameSink, SessionConfig};
use wscapture_server::SinkFactory;

/// Everything a [`RecordingSink`] has seen
#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: Vec<usize>,
    pub closes: usize,
}

/// In-memory sink that records frame sizes and close calls
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<Recorded>>,
    fail_writes: bool,
    fail_close: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub fn frames(&self) -> usize {
        self.state.lock().unwrap().frames.len()
    }

    pub fn frame_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().frames.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn write(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
        if self.fail_writes {
            return Err(CaptureError::SinkWrite {
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "encoder went away"),
            });
        }
        self.state.lock().unwrap().frames.push(frame.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        self.state.lock().unwrap().closes += 1;
        if self.fail_close {
            return Err(CaptureError::PipeClose {
                source: std::io::Error::new(std::io::ErrorKind::Other, "close failed"),
            });
        }
        Ok(())
    }
}

/// Hands out clones of one recording sink
pub struct RecordingFactory {
    pub sink: RecordingSink,
}

impl SinkFactory for RecordingFactory {
    fn open(&self, _config: &SessionConfig) -> Result<Box<dyn FrameSink>, CaptureError> {
        Ok(Box::new(self.sink.clone()))
    }
}

/// Always fails the way a same-second output collision does
pub struct CollidingFactory;

impl SinkFactory for CollidingFactory {
    fn open(&self, _config: &SessionConfig) -> Result<Box<dyn FrameSink>, CaptureError> {
        Err(CaptureError::AlreadyExists {
            path: PathBuf::from("videos/2024-05-01T12-30-00.mkv"),
        })
    }
}

/// 64x48 at 30 fps for two seconds
pub fn test_config() -> SessionConfig {
    SessionConfig::new(64, 48, 30.0, 2.0, "videos")
        .unwrap()
        .with_timeout(Duration::from_secs(2))
        .with_ping_interval(Duration::from_secs(20))
}

/// Server and client ends of an in-memory WebSocket
pub async fn socket_pair(
    config: &SessionConfig,
) -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (server_io, client_io) = tokio::io::duplex(1 << 20);
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.frame_byte_size());
    ws_config.max_frame_size = Some(config.frame_byte_size());
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, Some(ws_config)).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (server, client)
}
