/// Reasons a brace-balanced candidate is thrown away.
///
/// These never leave the crate's public read path; the scanner logs them and
/// resynchronizes on the next `{`.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The candidate balanced but is not valid JSON.
    #[error("malformed frame ({len} bytes): {source}")]
    Malformed {
        len: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The candidate grew past the configured size cap before balancing.
    #[error("frame too large ({size} bytes, max {max})")]
    Oversized { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
