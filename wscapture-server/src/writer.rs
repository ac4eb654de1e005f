//! Writer loop: handshake, acknowledgments and keep-alive pings

use crate::signal::FrameSignal;
use futures::{Sink, SinkExt};
use std::sync::Arc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tungstenite::Message;
use wscapture_core::{CaptureError, ServerMessage, SessionConfig};

pub(crate) struct WriterLoop {
    config: Arc<SessionConfig>,
    signal: Arc<FrameSignal>,
    /// Raised by the reader when it exits
    done: CancellationToken,
    /// Raised exactly once when this loop exits
    stopped: CancellationToken,
}

impl WriterLoop {
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        signal: Arc<FrameSignal>,
        done: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        Self {
            config,
            signal,
            done,
            stopped,
        }
    }

    pub(crate) async fn run<Si>(self, mut sink: Si) -> (Si, Option<CaptureError>)
    where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let _stopped = self.stopped.clone().drop_guard();

        let result = self.write_messages(&mut sink).await;
        (sink, result.err())
    }

    async fn write_messages<Si>(&self, sink: &mut Si) -> Result<(), CaptureError>
    where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let start = ServerMessage::start(&self.config).to_json()?;
        self.send(sink, Message::Text(start), "sendStart").await?;

        let period = self.config.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut acked = 0;

        loop {
            // A pending ack is flushed before termination is honoured; the
            // reader stops notifying once it is done, so neither can starve.
            tokio::select! {
                biased;
                _ = ping.tick() => {
                    self.send(sink, Message::Ping(Vec::new()), "ping").await?;
                }
                _ = self.signal.advanced() => {
                    let count = self.signal.current();
                    if count != acked {
                        let ack = ServerMessage::ack(count).to_json()?;
                        self.send(sink, Message::Text(ack), "ack").await?;
                        acked = count;
                    }
                }
                _ = self.done.cancelled() => return Ok(()),
            }
        }
    }

    /// Send one message under a fresh write deadline
    async fn send<Si>(&self, sink: &mut Si, message: Message, operation: &str) -> Result<(), CaptureError>
    where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let result = match timeout(self.config.timeout, sink.send(message)).await {
            Ok(result) => result.map_err(CaptureError::from),
            Err(_) => Err(CaptureError::Timeout {
                operation: operation.to_string(),
                duration: self.config.timeout,
            }),
        };
        if let Err(e) = &result {
            tracing::error!("{}: {}", operation, e);
        }
        result
    }
}
