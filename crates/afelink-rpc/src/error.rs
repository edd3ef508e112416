use serde_json::Value;

/// Errors that can occur while talking to the bridge.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error (open, write).
    #[error("transport error: {0}")]
    Transport(#[from] afelink_transport::TransportError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No complete frame arrived in time, or the stream ended first.
    #[error("no valid JSON frame received within {timeout:?}")]
    NoResponse { timeout: std::time::Duration },

    /// The response answers a different request.
    #[error("mismatched response id: expected {expected}, got {got}")]
    IdMismatch { expected: u64, got: Value },

    /// The device reported an error.
    #[error("device error: {0}")]
    PeerError(Value),

    /// The frame parsed but is not a response object.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The response carried a result of the wrong shape.
    #[error("unexpected result: expected {expected}, got {got}")]
    UnexpectedResult { expected: &'static str, got: Value },

    /// A value was needed but the connection is not open.
    #[error("serial port not open")]
    PortClosed,

    /// A status poll ran out of attempts or time.
    #[error("register {address:#06x} not ready after {attempts} reads")]
    PollExhausted { address: u32, attempts: u32 },
}

pub type Result<T> = std::result::Result<T, RpcError>;
