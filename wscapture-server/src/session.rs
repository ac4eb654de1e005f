//! Frame-streaming session
//!
//! A session pairs one upgraded socket with one frame sink and runs two
//! tasks over them: the reader pulls frames into the sink, the writer sends
//! the start handshake, acknowledgments and pings. The reader decides when
//! the session ends; teardown then closes the socket and afterwards the
//! sink, exactly once.

use crate::reader::{ReaderLoop, ReaderOutcome};
use crate::signal::FrameSignal;
use crate::writer::WriterLoop;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tungstenite::Message;
use uuid::Uuid;
use wscapture_core::{CaptureError, FrameSink, SessionConfig};

/// Why the reader loop stopped
#[derive(Debug)]
pub enum EndReason {
    /// The client sent a zero-length binary message
    EndOfStream,
    /// The client sent a close frame
    ClientClosed,
    /// The client broke the framing rules
    Violation(CaptureError),
    /// The socket failed or a read deadline expired
    Transport(CaptureError),
    /// The sink rejected a frame
    SinkFailed(CaptureError),
    /// The writer gave up first
    WriterStopped,
    /// A session task panicked
    Aborted(String),
}

impl EndReason {
    /// Whether the client finished the recording on purpose
    pub fn is_graceful(&self) -> bool {
        matches!(self, EndReason::EndOfStream | EndReason::ClientClosed)
    }
}

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionReport {
    /// Session ID
    pub id: Uuid,
    /// Frames accepted from the client, counted before the sink write
    pub frames: u64,
    /// Why the reader stopped
    pub reason: EndReason,
    /// Error that stopped the writer, if any
    pub writer_error: Option<CaptureError>,
    /// Error reported by the sink on close, if any
    pub sink_error: Option<CaptureError>,
    /// Output produced by the sink
    pub output: Option<PathBuf>,
}

impl SessionReport {
    /// Graceful end and a cleanly finalized output
    pub fn is_clean(&self) -> bool {
        self.reason.is_graceful() && self.sink_error.is_none()
    }
}

/// One socket connection paired with one output
pub struct Session<S> {
    id: Uuid,
    socket: WebSocketStream<S>,
    sink: Box<dyn FrameSink>,
    config: Arc<SessionConfig>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Pair an upgraded socket with an opened sink
    pub fn new(socket: WebSocketStream<S>, sink: Box<dyn FrameSink>, config: Arc<SessionConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            socket,
            sink,
            config,
        }
    }

    /// Session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run both loops to completion and tear the session down
    pub async fn run(self) -> SessionReport {
        let Session {
            id,
            socket,
            sink,
            config,
        } = self;
        let (ws_sink, ws_stream) = socket.split();
        drive(id, ws_sink, ws_stream, sink, config).await
    }
}

/// Runs the reader and writer over the two socket halves, then tears down.
async fn drive<Si, St>(
    id: Uuid,
    ws_sink: Si,
    ws_stream: St,
    sink: Box<dyn FrameSink>,
    config: Arc<SessionConfig>,
) -> SessionReport
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
{
    let output = sink.output_path().map(|path| path.to_path_buf());
    let signal = Arc::new(FrameSignal::new());
    let done = CancellationToken::new();
    let writer_stopped = CancellationToken::new();

    let reader = ReaderLoop::new(
        config.clone(),
        signal.clone(),
        done.clone(),
        writer_stopped.clone(),
    );
    let writer = WriterLoop::new(config.clone(), signal, done, writer_stopped);

    let span = tracing::Span::current();
    let reader = tokio::spawn(reader.run(ws_stream, sink).instrument(span.clone()));
    let writer = tokio::spawn(writer.run(ws_sink).instrument(span));
    let (reader, writer) = tokio::join!(reader, writer);

    let (ws_stream, sink, frames, reason) = match reader {
        Ok(ReaderOutcome {
            stream,
            sink,
            frames,
            reason,
        }) => (Some(stream), Some(sink), frames, reason),
        Err(e) => {
            tracing::error!("Reader task failed: {}", e);
            (None, None, 0, EndReason::Aborted(e.to_string()))
        }
    };
    let (ws_sink, writer_error) = match writer {
        Ok((ws_sink, error)) => (Some(ws_sink), error),
        Err(e) => {
            tracing::error!("Writer task failed: {}", e);
            (None, None)
        }
    };

    tracing::info!("Closing socket");
    if let Some(mut ws_sink) = ws_sink {
        match timeout(config.timeout, ws_sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Socket close: {}", e),
            Err(_) => tracing::debug!("Socket close timed out"),
        }
    }
    drop(ws_stream);

    let sink_error = match sink {
        Some(mut sink) => sink.close().await.err(),
        None => None,
    };
    if let Some(e) = &sink_error {
        tracing::error!("Failed to encode: {}", e);
    }

    SessionReport {
        id,
        frames,
        reason,
        writer_error,
        sink_error,
        output,
    }
}
