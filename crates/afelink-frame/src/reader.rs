use std::time::Duration;

use afelink_transport::{ByteSource, Chunk};
use tracing::{debug, trace, warn};

use crate::scanner::FrameScanner;
use crate::timeout::TimeoutGuard;
use crate::Frame;

/// Default budget for one frame: the bridge answers well inside 50 ms.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

/// Default cap on a single frame: 64 KiB (large FIFO dumps).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 1024;

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// A complete, parsed frame.
    Frame(Frame),
    /// No frame completed within the budget.
    Timeout,
    /// The stream ended or failed before a frame completed.
    EndOfStream,
}

impl Extracted {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Extracted::Frame(frame) => Some(frame),
            Extracted::Timeout | Extracted::EndOfStream => None,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, Extracted::Frame(_))
    }
}

/// Configuration for frame extraction.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Budget per read and for the whole frame. Default: 50 ms.
    pub timeout: Duration,
    /// Largest frame kept before it is discarded. Default: 64 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Pulls complete frames out of a [`ByteSource`].
///
/// Handles partial reads internally and never returns an error: every failure
/// collapses into [`Extracted::Timeout`] or [`Extracted::EndOfStream`].
pub struct FrameReader<S> {
    inner: S,
    scanner: FrameScanner,
    config: FrameConfig,
}

impl<S: ByteSource> FrameReader<S> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: S, config: FrameConfig) -> Self {
        Self {
            inner,
            scanner: FrameScanner::new(config.max_frame_size),
            config,
        }
    }

    /// Extract the next frame using the configured timeout.
    pub fn read_frame(&mut self) -> Extracted {
        self.extract_frame(self.config.timeout)
    }

    /// Extract the next frame, spending at most `timeout` on it.
    ///
    /// A frame left incomplete by an earlier call is abandoned; bytes queued
    /// after an earlier frame are scanned before reading more.
    pub fn extract_frame(&mut self, timeout: Duration) -> Extracted {
        let guard = TimeoutGuard::start(timeout);
        self.scanner.begin();

        if let Some(frame) = self.scanner.scan_pending() {
            return Extracted::Frame(frame);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read_chunk(&mut chunk, guard.per_read()) {
                Ok(Chunk::Data(n)) => {
                    trace!(bytes = n, "chunk received");
                    if let Some(frame) = self.scanner.feed(&chunk[..n]) {
                        return Extracted::Frame(frame);
                    }
                }
                Ok(Chunk::TimedOut) => {
                    debug!(
                        elapsed_ms = guard.elapsed().as_millis() as u64,
                        in_frame = self.scanner.in_frame(),
                        "read timed out before a frame completed"
                    );
                    return Extracted::Timeout;
                }
                Ok(Chunk::Closed) => {
                    debug!("stream ended before a frame completed");
                    return Extracted::EndOfStream;
                }
                Err(err) => {
                    warn!(%err, "read failed; abandoning frame");
                    return Extracted::EndOfStream;
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

    /// Drop queued and buffered input, on our side and in the source.
    ///
    /// Returns the number of bytes dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = self.scanner.clear();
        match self.inner.discard_input() {
            Ok(n) => dropped += n,
            Err(err) => warn!(%err, "failed to discard source input"),
        }
        dropped
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Update the default extraction timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Update the frame size cap for subsequent frames.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
        self.scanner.set_max_frame_size(max_frame_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<S> std::fmt::Debug for FrameReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("config", &self.config)
            .field("scanner", &self.scanner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::time::Instant;

    use afelink_transport::{ScriptedSource, Step};
    use serde_json::json;

    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    fn reader(steps: Vec<Step>) -> FrameReader<ScriptedSource> {
        FrameReader::with_config(
            ScriptedSource::with_steps(steps),
            FrameConfig {
                timeout: SHORT,
                ..FrameConfig::default()
            },
        )
    }

    #[test]
    fn reads_frame_from_single_chunk() {
        let mut r = reader(vec![Step::data(r#"{"id":0,"result":42}"#)]);
        assert_eq!(
            r.read_frame(),
            Extracted::Frame(json!({"id":0,"result":42}))
        );
    }

    #[test]
    fn identical_frame_at_every_split_offset() {
        let wire = "noise{\"id\":7,\"result\":{\"unit\":\"\u{3bc}A\",\"v\":[1,2]}}";
        let bytes = wire.as_bytes();
        let expected = json!({"id":7,"result":{"unit":"\u{3bc}A","v":[1,2]}});

        for split in 1..bytes.len() {
            let mut r = reader(vec![
                Step::data(&bytes[..split]),
                Step::data(&bytes[split..]),
            ]);
            assert_eq!(
                r.read_frame(),
                Extracted::Frame(expected.clone()),
                "split at byte {split}"
            );
        }
    }

    #[test]
    fn byte_by_byte_delivery() {
        let wire = br#"{"id":1,"result":"done"}"#;
        let steps: Vec<_> = wire.iter().map(|b| Step::data([*b])).collect();
        let mut r = FrameReader::with_config(
            ScriptedSource::with_steps(steps),
            FrameConfig {
                timeout: Duration::from_secs(1),
                ..FrameConfig::default()
            },
        );
        assert_eq!(
            r.read_frame(),
            Extracted::Frame(json!({"id":1,"result":"done"}))
        );
    }

    #[test]
    fn unbalanced_frame_times_out() {
        let mut r = reader(vec![Step::data(r#"{"id":1,"result":{"#), Step::Stall]);
        assert_eq!(r.read_frame(), Extracted::Timeout);
    }

    #[test]
    fn trickling_stream_hits_total_budget() {
        let steps = (0..40)
            .map(|_| Step::delayed(Duration::from_millis(5), "{"))
            .collect();
        let mut r = reader(steps);

        let started = Instant::now();
        assert_eq!(r.read_frame(), Extracted::Timeout);
        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(r.get_ref().remaining() > 0);
    }

    #[test]
    fn resynchronizes_to_next_valid_frame() {
        let mut r = reader(vec![
            Step::data(r#"{"id":1,"result":}"#),
            Step::data("\r\n"),
            Step::data(r#"{"id":2,"result":3}"#),
        ]);
        assert_eq!(r.read_frame(), Extracted::Frame(json!({"id":2,"result":3})));
    }

    #[test]
    fn end_of_stream_before_frame() {
        let mut r = reader(vec![Step::data(r#"{"id":"#), Step::Close]);
        assert_eq!(r.read_frame(), Extracted::EndOfStream);
    }

    #[test]
    fn read_error_collapses_to_end_of_stream() {
        let mut r = reader(vec![Step::Fail(ErrorKind::ConnectionReset)]);
        assert_eq!(r.read_frame(), Extracted::EndOfStream);
    }

    #[test]
    fn second_frame_in_same_chunk_is_kept() {
        let mut r = reader(vec![Step::data(r#"{"id":1}{"id":2}"#)]);
        assert_eq!(r.read_frame(), Extracted::Frame(json!({"id":1})));
        assert_eq!(r.read_frame(), Extracted::Frame(json!({"id":2})));
        assert_eq!(r.get_ref().reads(), 1);
    }

    #[test]
    fn timed_out_partial_is_abandoned_on_next_call() {
        let mut r = reader(vec![
            Step::data(r#"{"id":1,"res"#),
            Step::Stall,
            Step::data(r#"{"id":2}"#),
        ]);
        assert_eq!(r.read_frame(), Extracted::Timeout);
        assert_eq!(r.read_frame(), Extracted::Frame(json!({"id":2})));
    }

    #[test]
    fn discard_pending_drops_queued_frames() {
        let mut r = reader(vec![Step::data(r#"{"id":1}{"id":2}"#), Step::data("xyz")]);
        assert!(r.read_frame().is_frame());
        assert_eq!(r.discard_pending(), 11);
        assert_eq!(r.read_frame(), Extracted::Timeout);
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut r = reader(Vec::new());
        r.set_timeout(Duration::from_millis(5));
        r.set_max_frame_size(128);
        assert_eq!(r.config().timeout, Duration::from_millis(5));
        assert_eq!(r.config().max_frame_size, 128);
        let _ = r.get_ref();
        let _ = r.get_mut();
        let _inner = r.into_inner();
    }

    #[cfg(unix)]
    #[test]
    fn frames_over_socket_pair() {
        use afelink_transport::StreamSource;
        use std::os::unix::net::UnixStream;

        let (left, right) = UnixStream::pair().unwrap();
        let mut device = StreamSource::new(left);
        let mut r = FrameReader::new(StreamSource::new(right));

        let writer = std::thread::spawn(move || {
            device.write_bytes(br#"{"id":4,"#).unwrap();
            std::thread::sleep(Duration::from_millis(5));
            device.write_bytes(br#""result":"done"}"#).unwrap();
            device
        });

        assert_eq!(
            r.read_frame(),
            Extracted::Frame(json!({"id":4,"result":"done"}))
        );
        let _ = writer.join().unwrap();
    }
}
