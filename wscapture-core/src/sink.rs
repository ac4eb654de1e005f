//! Destination for accepted frame bytes

use crate::error::CaptureError;
use async_trait::async_trait;
use std::path::Path;

/// Accepts raw frame bytes and finalizes the output on close.
///
/// A session owns exactly one sink and calls [`FrameSink::close`] exactly once,
/// after which the sink must not be written to.
#[async_trait]
pub trait FrameSink: Send {
    /// Append `frame` to the output, blocking until every byte is accepted
    async fn write(&mut self, frame: &[u8]) -> Result<(), CaptureError>;

    /// Release all resources and finalize the output
    async fn close(&mut self) -> Result<(), CaptureError>;

    /// File this sink produces, if any
    fn output_path(&self) -> Option<&Path> {
        None
    }
}
