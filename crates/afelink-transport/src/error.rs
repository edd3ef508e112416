/// Errors that can occur on a byte stream source.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the named port.
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    /// Failed to enumerate available ports.
    #[error("failed to list ports: {0}")]
    Enumerate(String),

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer stopped accepting bytes mid-write.
    #[error("stream closed during write ({written} of {len} bytes sent)")]
    WriteClosed { written: usize, len: usize },

    /// The source has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
