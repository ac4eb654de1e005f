//! Frame counter shared by the reader and writer loops

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Lock-free frame counter with a coalescing "counter advanced" wake-up.
///
/// Only the reader advances the counter and only the writer waits on it.
/// The wake-up carries no payload: a pending wake-up absorbs any number of
/// further notifications, and the writer always re-reads [`FrameSignal::current`].
#[derive(Debug, Default)]
pub struct FrameSignal {
    count: AtomicU64,
    advanced: Notify,
}

impl FrameSignal {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new frame count
    pub fn store(&self, count: u64) {
        self.count.store(count, Ordering::Release);
    }

    /// Wake the writer; a no-op if a wake-up is already pending
    pub fn notify(&self) {
        self.advanced.notify_one();
    }

    /// Latest published frame count
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until the counter has been advanced since the last wake-up
    pub async fn advanced(&self) {
        self.advanced.notified().await;
    }
}
