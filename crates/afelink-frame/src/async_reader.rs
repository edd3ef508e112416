use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::reader::{Extracted, FrameConfig};
use crate::scanner::FrameScanner;
use crate::timeout::TimeoutGuard;

const READ_CHUNK_SIZE: usize = 1024;
const MAX_DISCARD_READS: usize = 64;
const DISCARD_POLL: Duration = Duration::from_millis(1);

/// Async counterpart of [`FrameReader`](crate::FrameReader) over a tokio
/// `AsyncRead`.
///
/// Each read is raced against the budget with `tokio::time::timeout`. A read
/// that loses the race is dropped; tokio reads are cancel-safe, so no bytes
/// are lost to it.
pub struct AsyncFrameReader<S> {
    inner: S,
    scanner: FrameScanner,
    config: FrameConfig,
}

impl<S: AsyncRead + Unpin> AsyncFrameReader<S> {
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: S, config: FrameConfig) -> Self {
        Self {
            inner,
            scanner: FrameScanner::new(config.max_frame_size),
            config,
        }
    }

    /// Extract the next frame using the configured timeout.
    pub async fn read_frame(&mut self) -> Extracted {
        self.extract_frame(self.config.timeout).await
    }

    /// Extract the next frame, spending at most `timeout` on it.
    pub async fn extract_frame(&mut self, timeout: Duration) -> Extracted {
        let guard = TimeoutGuard::start(timeout);
        self.scanner.begin();

        if let Some(frame) = self.scanner.scan_pending() {
            return Extracted::Frame(frame);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let read = tokio::time::timeout(guard.per_read(), self.inner.read(&mut chunk)).await;
            match read {
                Ok(Ok(0)) => {
                    debug!("stream ended before a frame completed");
                    return Extracted::EndOfStream;
                }
                Ok(Ok(n)) => {
                    trace!(bytes = n, "chunk received");
                    if let Some(frame) = self.scanner.feed(&chunk[..n]) {
                        return Extracted::Frame(frame);
                    }
                }
                Ok(Err(err)) => {
                    warn!(%err, "read failed; abandoning frame");
                    return Extracted::EndOfStream;
                }
                Err(_elapsed) => {
                    debug!(
                        elapsed_ms = guard.elapsed().as_millis() as u64,
                        in_frame = self.scanner.in_frame(),
                        "read timed out before a frame completed"
                    );
                    return Extracted::Timeout;
                }
            }

            if guard.expired() {
                debug!(
                    budget_ms = guard.budget().as_millis() as u64,
                    depth = self.scanner.depth(),
                    "frame assembly exceeded its budget"
                );
                return Extracted::Timeout;
            }
        }
    }

    /// Drop queued input, any partial frame, and whatever the stream has
    /// ready to read.
    ///
    /// The stream is drained until it stays quiet for one short poll, up to
    /// a fixed number of polls. Returns the number of bytes dropped.
    pub async fn discard_pending(&mut self) -> usize {
        let mut dropped = self.scanner.clear();
        let mut scratch = [0u8; 256];
        for _ in 0..MAX_DISCARD_READS {
            match tokio::time::timeout(DISCARD_POLL, self.inner.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => dropped += n,
                Ok(Err(err)) => {
                    warn!(%err, "failed to discard stream input");
                    break;
                }
            }
        }
        dropped
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
