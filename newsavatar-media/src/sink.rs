//! Video sinks for the remote stream

use crate::error::{MediaError, MediaResult};
use crate::tracks::RemoteStream;
use parking_lot::Mutex;

/// Renderable target for the provider's stream
pub trait VideoSink: Send + Sync {
    /// Start rendering `stream`
    fn attach(&self, stream: &RemoteStream) -> MediaResult<()>;

    /// Stop rendering and drop the current stream
    fn detach(&self);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl VideoSink for NullSink {
    fn attach(&self, _stream: &RemoteStream) -> MediaResult<()> {
        Ok(())
    }

    fn detach(&self) {}
}

/// Sink that remembers what it was given; useful for headless runs
#[derive(Debug, Default)]
pub struct MemorySink {
    current: Mutex<Option<RemoteStream>>,
    attached: Mutex<u64>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream currently attached
    pub fn current(&self) -> Option<RemoteStream> {
        self.current.lock().clone()
    }

    /// Number of successful attaches so far
    pub fn attach_count(&self) -> u64 {
        *self.attached.lock()
    }
}

impl VideoSink for MemorySink {
    fn attach(&self, stream: &RemoteStream) -> MediaResult<()> {
        if stream.is_stopped() && !stream.tracks().is_empty() {
            return Err(MediaError::Sink {
                reason: format!("stream {} has no live tracks", stream.id()),
            });
        }
        *self.current.lock() = Some(stream.clone());
        *self.attached.lock() += 1;
        Ok(())
    }

    fn detach(&self) {
        self.current.lock().take();
    }
}
