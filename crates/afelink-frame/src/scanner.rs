use bytes::BytesMut;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Incremental brace-depth scanner.
///
/// Bytes go in through [`feed`](FrameScanner::feed); the first complete frame
/// comes out. Bytes after that frame stay queued and are scanned first by the
/// next call. A UTF-8 sequence split across chunks is held back until its
/// remaining bytes arrive; invalid sequences decode as U+FFFD.
#[derive(Debug)]
pub struct FrameScanner {
    /// Input not yet scanned.
    pending: BytesMut,
    /// Text of the frame being assembled.
    text: String,
    depth: usize,
    started: bool,
    max_frame_size: usize,
}

enum Tail {
    Complete,
    Incomplete,
    Invalid(usize),
}

impl FrameScanner {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            text: String::with_capacity(INITIAL_BUFFER_CAPACITY),
            depth: 0,
            started: false,
            max_frame_size,
        }
    }

    /// Abandon any partial frame. Queued input is kept.
    pub fn begin(&mut self) {
        self.text.clear();
        self.depth = 0;
        self.started = false;
    }

    /// Abandon any partial frame and drop queued input.
    ///
    /// Returns the number of bytes dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len() + self.text.len();
        self.begin();
        self.pending.clear();
        dropped
    }

    /// True while a `{` has been seen and its frame is not yet balanced.
    pub fn in_frame(&self) -> bool {
        self.started
    }

    /// Current brace depth of the frame being assembled.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes queued but not yet scanned.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    /// Queue `bytes` and scan for the next complete frame.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Value> {
        self.pending.extend_from_slice(bytes);
        self.scan_pending()
    }

    /// Scan queued input for the next complete frame.
    pub fn scan_pending(&mut self) -> Option<Value> {
        let input = self.pending.split();
        let mut offset = 0usize;

        while offset < input.len() {
            let (text, tail) = decode_prefix(&input[offset..]);

            if let Some((end, frame)) = self.scan_text(text) {
                self.pending.extend_from_slice(&input[offset + end..]);
                return Some(frame);
            }
            offset += text.len();

            match tail {
                Tail::Complete => break,
                Tail::Incomplete => {
                    self.pending.extend_from_slice(&input[offset..]);
                    break;
                }
                Tail::Invalid(len) => {
                    self.scan_char(char::REPLACEMENT_CHARACTER);
                    offset += len;
                }
            }
        }

        None
    }

    /// Returns the frame and the byte offset just past its closing brace.
    fn scan_text(&mut self, text: &str) -> Option<(usize, Value)> {
        for (idx, ch) in text.char_indices() {
            if let Some(frame) = self.scan_char(ch) {
                return Some((idx + ch.len_utf8(), frame));
            }
        }
        None
    }

    fn scan_char(&mut self, ch: char) -> Option<Value> {
        if ch == '{' {
            if !self.started {
                self.started = true;
                self.text.clear();
                self.depth = 0;
            }
            self.depth += 1;
        }

        if !self.started {
            return None;
        }

        self.text.push(ch);
        if self.text.len() > self.max_frame_size {
            let err = FrameError::Oversized {
                size: self.text.len(),
                max: self.max_frame_size,
            };
            warn!(%err, "discarding frame");
            self.begin();
            return None;
        }

        if ch == '}' {
            self.depth -= 1;
            if self.depth == 0 {
                match self.complete() {
                    Ok(frame) => return Some(frame),
                    Err(err) => warn!(%err, "discarding frame"),
                }
            }
        }

        None
    }

    fn complete(&mut self) -> Result<Value> {
        trace!(frame = %self.text, "frame balanced");
        let parsed = serde_json::from_str::<Value>(&self.text).map_err(|source| {
            FrameError::Malformed {
                len: self.text.len(),
                source,
            }
        });
        self.begin();
        parsed
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new(crate::reader::DEFAULT_MAX_FRAME_SIZE)
    }
}

/// Longest valid UTF-8 prefix of `bytes`, plus what stops it.
fn decode_prefix(bytes: &[u8]) -> (&str, Tail) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text, Tail::Complete),
        Err(err) => {
            let head = &bytes[..err.valid_up_to()];
            let text = std::str::from_utf8(head).unwrap_or_default();
            match err.error_len() {
                None => (text, Tail::Incomplete),
                Some(len) => (text, Tail::Invalid(len)),
            }
        }
    }
}
