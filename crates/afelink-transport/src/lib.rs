//! Byte stream sources for the afelink serial protocol.
//!
//! The rest of afelink only needs two things from a link: write some bytes,
//! and read whatever arrives within a bounded amount of time. This crate
//! defines that boundary ([`ByteSource`]) and provides adapters for:
//! - serial ports (behind the `serial` feature)
//! - any `Read + Write` stream with a settable read timeout (Unix sockets, TCP)
//!
//! Port discovery and lifecycle stay here; framing and request correlation
//! live in `afelink-frame` and `afelink-rpc`.

pub mod error;
pub mod source;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(any(test, feature = "test-utils"))]
pub mod script;

pub use error::{Result, TransportError};
pub use source::{ByteSource, Chunk, ReadTimeout, StreamSource};

#[cfg(feature = "serial")]
pub use serial::{available_ports, PortInfo, SerialConfig, SerialStream, DEFAULT_BAUD_RATE};

#[cfg(any(test, feature = "test-utils"))]
pub use script::{ScriptedSource, Step};
