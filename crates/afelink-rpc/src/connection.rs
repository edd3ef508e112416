use std::time::Duration;

use afelink_frame::{FrameConfig, FrameReader, DEFAULT_MAX_FRAME_SIZE, DEFAULT_TIMEOUT};
use afelink_transport::ByteSource;
use tracing::{debug, error, warn};

use crate::correlate::{encode_request, finish_request, resolve_id};
use crate::envelope::Params;
use crate::error::Result;
use crate::response::Response;

/// Runtime configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long to wait for each response frame. Default: 50 ms.
    pub response_timeout: Duration,
    /// Coerce `address` / `data` / `mask` to u32 before sending. Default: on.
    pub canonicalize: bool,
    /// Largest accepted response frame. Default: 64 KiB.
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_TIMEOUT,
            canonicalize: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionConfig {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            timeout: self.response_timeout,
            max_frame_size: self.max_frame_size,
        }
    }
}

/// Anything that can run one request/response exchange.
///
/// Register helpers are written against this so they work on a plain
/// [`Connection`] and on a [`SharedConnection`](crate::SharedConnection).
pub trait Exchange {
    /// Send `method` with `params` and wait for the matching response.
    ///
    /// Returns `Ok(None)` when the connection is not open.
    fn exchange_request(
        &mut self,
        method: &str,
        params: Params,
        explicit_id: Option<u64>,
    ) -> Result<Option<Response>>;
}

/// One link to the bridge.
///
/// Owns the byte source and the request id counter. At most one request is
/// in flight: the first frame read after a write is taken as its response.
/// Share between threads through [`SharedConnection`](crate::SharedConnection).
pub struct Connection<S> {
    reader: Option<FrameReader<S>>,
    next_id: u64,
    config: ConnectionConfig,
}

impl<S: ByteSource> Connection<S> {
    /// Wrap an already-open source with default configuration.
    pub fn open(source: S) -> Self {
        Self::open_with_config(source, ConnectionConfig::default())
    }

    /// Wrap an already-open source with explicit configuration.
    pub fn open_with_config(source: S, config: ConnectionConfig) -> Self {
        let mut conn = Self::closed_with_config(config);
        conn.attach(source);
        conn
    }

    /// A connection with no source attached yet.
    pub fn closed() -> Self {
        Self::closed_with_config(ConnectionConfig::default())
    }

    pub fn closed_with_config(config: ConnectionConfig) -> Self {
        Self {
            reader: None,
            next_id: 0,
            config,
        }
    }

    /// Attach a freshly opened source. The id counter carries on.
    ///
    /// A previously attached source is dropped.
    pub fn attach(&mut self, source: S) {
        if self.reader.is_some() {
            debug!("replacing open source");
        }
        self.reader = Some(FrameReader::with_config(source, self.config.frame_config()));
        debug!(next_id = self.next_id, "connection opened");
    }

    /// Detach and return the source. Later requests are skipped until
    /// [`attach`](Connection::attach) is called again.
    pub fn close(&mut self) -> Option<S> {
        let source = self.reader.take().map(FrameReader::into_inner);
        if source.is_some() {
            debug!("connection closed");
        }
        source
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Id the next request without an explicit id will use.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Change the response timeout for subsequent requests.
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.config.response_timeout = timeout;
        if let Some(reader) = self.reader.as_mut() {
            reader.set_timeout(timeout);
        }
    }

    pub fn set_canonicalize(&mut self, canonicalize: bool) {
        self.config.canonicalize = canonicalize;
    }

    /// Borrow the attached source.
    pub fn source(&self) -> Option<&S> {
        self.reader.as_ref().map(FrameReader::get_ref)
    }

    /// Mutably borrow the attached source.
    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.reader.as_mut().map(FrameReader::get_mut)
    }

    /// Drop stale input, such as a late reply to a request that timed out.
    ///
    /// Returns the number of bytes dropped.
    pub fn flush_input(&mut self) -> usize {
        match self.reader.as_mut() {
            Some(reader) => {
                let dropped = reader.discard_pending();
                debug!(dropped, "input flushed");
                dropped
            }
            None => 0,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Without `explicit_id` the connection's counter supplies the id and is
    /// advanced, even if the request is then skipped. When the connection is
    /// closed the request is logged and skipped with `Ok(None)`. Missing,
    /// mismatched and error responses are returned as errors.
    pub fn exchange_request(
        &mut self,
        method: &str,
        params: Params,
        explicit_id: Option<u64>,
    ) -> Result<Option<Response>> {
        let id = resolve_id(&mut self.next_id, explicit_id);

        let Some(reader) = self.reader.as_mut() else {
            warn!(method, id, "serial port not open; request skipped");
            return Ok(None);
        };

        let wire = encode_request(method, id, params, self.config.canonicalize)?;
        reader
            .get_mut()
            .write_bytes(&wire)
            .inspect_err(|err| error!(method, id, %err, "failed to write request"))?;

        let timeout = self.config.response_timeout;
        let outcome = reader.extract_frame(timeout);
        finish_request(method, id, outcome, timeout).map(Some)
    }
}

impl<S: ByteSource> Exchange for Connection<S> {
    fn exchange_request(
        &mut self,
        method: &str,
        params: Params,
        explicit_id: Option<u64>,
    ) -> Result<Option<Response>> {
        Connection::exchange_request(self, method, params, explicit_id)
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.reader.is_some())
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .finish()
    }
}
