//! Capture server implementation

use crate::session::{Session, SessionReport};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::Instrument;
use uuid::Uuid;
use wscapture_core::{CaptureError, FrameSink, SessionConfig};

/// Path the capturing page opens its socket on
pub const SOCKET_PATH: &str = "/__wscapture__/socket";

/// Opens one frame sink per session
///
/// `open` runs on the blocking thread pool and may block.
pub trait SinkFactory: Send + Sync + 'static {
    /// Open a sink for a new session
    fn open(&self, config: &SessionConfig) -> Result<Box<dyn FrameSink>, CaptureError>;
}

/// Sink factory that starts an ffmpeg process per session
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegSinkFactory;

#[cfg(unix)]
impl SinkFactory for FfmpegSinkFactory {
    fn open(&self, config: &SessionConfig) -> Result<Box<dyn FrameSink>, CaptureError> {
        Ok(Box::new(wscapture_core::FfmpegEncoder::open(config)?))
    }
}

/// A session currently streaming
#[derive(Debug, Clone)]
pub struct ActiveSession {
    /// Client address
    pub peer: SocketAddr,
    /// When the socket was upgraded
    pub started_at: DateTime<Utc>,
    /// File being written
    pub output: Option<PathBuf>,
}

/// WebSocket server accepting capture sessions
#[derive(Clone)]
pub struct CaptureServer {
    config: Arc<SessionConfig>,
    sinks: Arc<dyn SinkFactory>,
    sessions: Arc<DashMap<Uuid, ActiveSession>>,
}

impl fmt::Debug for CaptureServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureServer")
            .field("config", &self.config)
            .field("active_sessions", &self.sessions.len())
            .finish()
    }
}

impl CaptureServer {
    /// Create a server that encodes every session with ffmpeg
    #[cfg(unix)]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_sink_factory(config, Arc::new(FfmpegSinkFactory))
    }

    /// Create a server with a custom sink factory
    pub fn with_sink_factory(config: SessionConfig, sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            config: Arc::new(config),
            sinks,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bind `addr` and serve until the process exits
    pub async fn start(&self, addr: &str) -> Result<(), CaptureError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CaptureError::ServerStartFailed {
                address: addr.to_string(),
                source,
            })?;

        tracing::info!("Listening at http://{}/", addr);
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), CaptureError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("New connection from {}", peer);
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Upgrade one connection and run its session to completion.
    ///
    /// Returns `None` when no session was started: the upgrade failed, or the
    /// sink could not be opened (the socket is closed in that case).
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Option<SessionReport> {
        let upgrade = accept_hdr_async_with_config(stream, check_path, Some(self.websocket_config()));
        let mut ws = match timeout(self.config.timeout, upgrade).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                tracing::warn!("Could not upgrade WebSocket from {}: {}", peer, e);
                return None;
            }
            Err(_) => {
                tracing::warn!("WebSocket upgrade from {} timed out", peer);
                return None;
            }
        };

        let sink = match self.open_sink().await {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("Could not create encoder: {}", e);
                if let Err(e) = ws.close(None).await {
                    tracing::debug!("Socket close: {}", e);
                }
                return None;
            }
        };

        let output = sink.output_path().map(|path| path.to_path_buf());
        let session = Session::new(ws, sink, self.config.clone());
        let id = session.id();
        self.sessions.insert(
            id,
            ActiveSession {
                peer,
                started_at: Utc::now(),
                output,
            },
        );

        let span = tracing::info_span!("session", %id, %peer);
        let report = session.run().instrument(span).await;
        self.sessions.remove(&id);
        Some(report)
    }

    /// Opening a sink touches the filesystem and spawns a process
    async fn open_sink(&self) -> Result<Box<dyn FrameSink>, CaptureError> {
        let sinks = self.sinks.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || sinks.open(&config))
            .await
            .map_err(|e| CaptureError::SinkOpenAborted {
                reason: e.to_string(),
            })?
    }

    /// Sessions currently streaming (for monitoring/debugging)
    pub fn active_sessions(&self) -> Vec<(Uuid, ActiveSession)> {
        self.sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Number of sessions currently streaming
    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Any message larger than one frame is a protocol violation
    fn websocket_config(&self) -> WebSocketConfig {
        let frame_size = self.config.frame_byte_size();
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(frame_size);
        config.max_frame_size = Some(frame_size);
        config
    }
}

/// Only the capture socket path may be upgraded
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    if path == SOCKET_PATH {
        return Ok(response);
    }
    tracing::warn!("{} {}", StatusCode::NOT_FOUND.as_u16(), path);
    let mut error = ErrorResponse::new(Some(format!("Not found: {:?}", path)));
    *error.status_mut() = StatusCode::NOT_FOUND;
    Err(error)
}
