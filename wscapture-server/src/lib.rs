//! # wscapture server
//!
//! Accepts WebSocket connections from a capturing page, streams the raw
//! frames it sends into a frame sink, and paces the page with a small
//! acknowledgment protocol (start handshake, coalesced acks, pings).

#![deny(missing_docs)]
#![warn(clippy::all)]

mod reader;
pub mod server;
pub mod session;
pub mod signal;
mod writer;

// Re-export main types
pub use server::{ActiveSession, CaptureServer, SinkFactory, SOCKET_PATH};
#[cfg(unix)]
pub use server::FfmpegSinkFactory;
pub use session::{EndReason, Session, SessionReport};
pub use signal::FrameSignal;
