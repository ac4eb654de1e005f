//! Reader loop: frames from the socket into the sink

use crate::session::EndReason;
use crate::signal::FrameSignal;
use futures::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tungstenite::Message;
use wscapture_core::{BinaryMessage, CaptureError, FrameSink, SessionConfig};

/// Minimum spacing between throughput status lines
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// What the reader hands back to the session for teardown
pub(crate) struct ReaderOutcome<St> {
    pub(crate) stream: St,
    pub(crate) sink: Box<dyn FrameSink>,
    pub(crate) frames: u64,
    pub(crate) reason: EndReason,
}

pub(crate) struct ReaderLoop {
    config: Arc<SessionConfig>,
    signal: Arc<FrameSignal>,
    /// Raised exactly once when this loop exits
    done: CancellationToken,
    /// Raised by the writer if it gives up first
    writer_stopped: CancellationToken,
}

impl ReaderLoop {
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        signal: Arc<FrameSignal>,
        done: CancellationToken,
        writer_stopped: CancellationToken,
    ) -> Self {
        Self {
            config,
            signal,
            done,
            writer_stopped,
        }
    }

    pub(crate) async fn run<St>(self, mut stream: St, mut sink: Box<dyn FrameSink>) -> ReaderOutcome<St>
    where
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        // Fires on every exit path, unwinding included.
        let _done = self.done.clone().drop_guard();

        let mut frames = 0;
        let reason = self.read_frames(&mut stream, sink.as_mut(), &mut frames).await;
        ReaderOutcome {
            stream,
            sink,
            frames,
            reason,
        }
    }

    async fn read_frames<St>(&self, stream: &mut St, sink: &mut dyn FrameSink, frames: &mut u64) -> EndReason
    where
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let frame_size = self.config.frame_byte_size();
        let mut throughput = Throughput::new(Instant::now(), self.config.target_frames());

        loop {
            let next = tokio::select! {
                _ = self.writer_stopped.cancelled() => return EndReason::WriterStopped,
                next = timeout(self.config.timeout, stream.next()) => next,
            };

            let message = match next {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    let err = CaptureError::from(e);
                    tracing::error!("Read: {}", err);
                    return if err.is_protocol_violation() {
                        EndReason::Violation(err)
                    } else {
                        EndReason::Transport(err)
                    };
                }
                Ok(None) => {
                    let err = CaptureError::ConnectionClosed;
                    tracing::error!("Read: {}", err);
                    return EndReason::Transport(err);
                }
                Err(_) => {
                    let err = CaptureError::Timeout {
                        operation: "read".to_string(),
                        duration: self.config.timeout,
                    };
                    tracing::error!("Read: {}", err);
                    return EndReason::Transport(err);
                }
            };

            let data = match message {
                Message::Binary(data) => data,
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    tracing::info!("Client closed the socket");
                    tracing::info!("Frame count: {}", frames);
                    return EndReason::ClientClosed;
                }
                Message::Text(_) => return violation("text"),
                Message::Frame(_) => return violation("raw frame"),
            };

            match BinaryMessage::classify(data.len(), frame_size) {
                Ok(BinaryMessage::EndOfStream) => {
                    tracing::info!("Received end of stream");
                    tracing::info!("Frame count: {}", frames);
                    return EndReason::EndOfStream;
                }
                Ok(BinaryMessage::Frame) => {
                    *frames += 1;
                    self.signal.store(*frames);
                    if let Some(status) = throughput.poll(Instant::now(), *frames) {
                        tracing::info!("{}", status);
                    }
                    if let Err(e) = sink.write(&data).await {
                        tracing::error!("{}", e);
                        return EndReason::SinkFailed(e);
                    }
                    self.signal.notify();
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    return EndReason::Violation(e);
                }
            }
        }
    }
}

fn violation(kind: &str) -> EndReason {
    let err = CaptureError::UnexpectedMessage {
        kind: kind.to_string(),
    };
    tracing::error!("{}", err);
    EndReason::Violation(err)
}

/// Rate-limited throughput reporting
#[derive(Debug)]
pub(crate) struct Throughput {
    started: Instant,
    last_status: Instant,
    target: Option<u64>,
}

impl Throughput {
    pub(crate) fn new(started: Instant, target: Option<u64>) -> Self {
        Self {
            started,
            last_status: started,
            target,
        }
    }

    /// Status for `frames` at `now`, at most once per [`STATUS_INTERVAL`]
    pub(crate) fn poll(&mut self, now: Instant, frames: u64) -> Option<ThroughputStatus> {
        if now.duration_since(self.last_status) <= STATUS_INTERVAL {
            return None;
        }
        self.last_status = now;
        let elapsed = now.duration_since(self.started).as_secs_f64();
        Some(ThroughputStatus {
            frames,
            fps: frames as f64 / elapsed,
            target: self.target.filter(|target| *target > 0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ThroughputStatus {
    frames: u64,
    fps: f64,
    target: Option<u64>,
}

impl fmt::Display for ThroughputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(
                f,
                "Frame {}/{} [{:.1}%] ({:.2} FPS)",
                self.frames,
                target,
                100.0 * self.frames as f64 / target as f64,
                self.fps
            ),
            None => write!(f, "Frame {} ({:.2} FPS)", self.frames, self.fps),
        }
    }
}
