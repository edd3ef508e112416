//! Brace-balanced JSON framing over unreliable byte streams.
//!
//! The AFE bridge speaks bare JSON objects with no length prefix, checksum or
//! delimiter. A frame ends when its braces balance:
//! - a `{` outside a frame starts a new candidate and resets the buffer
//! - text is buffered while inside a candidate
//! - when depth returns to zero the candidate is parsed; invalid text is
//!   dropped and scanning resumes (resynchronization)
//!
//! Extraction never fails: callers get a [`Extracted::Frame`], a
//! [`Extracted::Timeout`] or an [`Extracted::EndOfStream`].
//!
//! Braces inside JSON strings are not special-cased. A string value holding
//! an unescaped `{` or `}` will desynchronize the scanner.

pub mod error;
pub mod reader;
pub mod scanner;
pub mod timeout;

#[cfg(feature = "async")]
pub mod async_reader;

pub use error::{FrameError, Result};
pub use reader::{Extracted, FrameConfig, FrameReader, DEFAULT_MAX_FRAME_SIZE, DEFAULT_TIMEOUT};
pub use scanner::FrameScanner;
pub use timeout::TimeoutGuard;

#[cfg(feature = "async")]
pub use async_reader::AsyncFrameReader;

/// A parsed frame: one complete JSON value.
pub type Frame = serde_json::Value;
