use std::sync::Arc;
use std::time::Duration;

use afelink_frame::{AsyncFrameReader, FrameConfig};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::connection::ConnectionConfig;
use crate::correlate::{encode_request, finish_request, resolve_id};
use crate::envelope::Params;
use crate::error::{Result, RpcError};
use crate::response::Response;

/// Async counterpart of [`Connection`](crate::Connection) over a tokio
/// `AsyncRead + AsyncWrite` stream.
pub struct AsyncConnection<S> {
    reader: Option<AsyncFrameReader<S>>,
    next_id: u64,
    config: ConnectionConfig,
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncConnection<S> {
    pub fn open(stream: S) -> Self {
        Self::open_with_config(stream, ConnectionConfig::default())
    }

    pub fn open_with_config(stream: S, config: ConnectionConfig) -> Self {
        let mut conn = Self::closed_with_config(config);
        conn.attach(stream);
        conn
    }

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

    /// Attach a stream. The id counter carries on.
    pub fn attach(&mut self, stream: S) {
        let frame_config = FrameConfig {
            timeout: self.config.response_timeout,
            max_frame_size: self.config.max_frame_size,
        };
        self.reader = Some(AsyncFrameReader::with_config(stream, frame_config));
        debug!(next_id = self.next_id, "connection opened");
    }

    pub fn close(&mut self) -> Option<S> {
        self.reader.take().map(AsyncFrameReader::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.config.response_timeout = timeout;
    }

    /// Drop stale input held by the accumulator or waiting on the stream.
    ///
    /// Returns the number of bytes dropped.
    pub async fn flush_input(&mut self) -> usize {
        match self.reader.as_mut() {
            Some(reader) => {
                let dropped = reader.discard_pending().await;
                debug!(dropped, "input flushed");
                dropped
            }
            None => 0,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Same contract as [`Connection::exchange_request`](crate::Connection::exchange_request).
    pub async fn exchange_request(
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
        let stream = reader.get_mut();
        let written = match stream.write_all(&wire).await {
            Ok(()) => stream.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            error!(method, id, %err, "failed to write request");
            return Err(RpcError::Transport(err.into()));
        }

        let timeout = self.config.response_timeout;
        let outcome = reader.extract_frame(timeout).await;
        finish_request(method, id, outcome, timeout).map(Some)
    }
}

impl<S> std::fmt::Debug for AsyncConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncConnection")
            .field("open", &self.reader.is_some())
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .finish()
    }
}

/// An [`AsyncConnection`] shared between tasks.
///
/// The lock is held across the whole write-then-read.
pub struct SharedAsyncConnection<S> {
    inner: Arc<Mutex<AsyncConnection<S>>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SharedAsyncConnection<S> {
    pub fn new(conn: AsyncConnection<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn exchange_request(
        &self,
        method: &str,
        params: Params,
        explicit_id: Option<u64>,
    ) -> Result<Option<Response>> {
        self.inner
            .lock()
            .await
            .exchange_request(method, params, explicit_id)
            .await
    }

    /// Lock the connection for a sequence of exchanges.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, AsyncConnection<S>> {
        self.inner.lock().await
    }
}

impl<S> Clone for SharedAsyncConnection<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for SharedAsyncConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAsyncConnection")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::envelope::params;

    /// Reads one request at a time and echoes `params.data` as the result,
    /// split across two writes.
    fn spawn_echo_device(mut device: DuplexStream) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let n = match device.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let req: Value = serde_json::from_slice(&buf[..n]).unwrap();
                let reply = json!({"id": req["id"], "result": req["params"]["data"]}).to_string();
                let (head, tail) = reply.split_at(5);
                device.write_all(head.as_bytes()).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                device.write_all(tail.as_bytes()).await.unwrap();
            }
        })
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            response_timeout: Duration::from_millis(500),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn request_round_trip_over_duplex() {
        let (host, device) = tokio::io::duplex(1024);
        let _device = spawn_echo_device(device);
        let mut conn = AsyncConnection::open_with_config(host, config());

        for (expected_id, data) in [(0u64, 7u32), (1, 0xDEAD_BEEF)] {
            let resp = conn
                .exchange_request("wr", params([("address", 1u32), ("data", data)]), None)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(resp.id, expected_id);
            assert_eq!(resp.result, json!(data));
        }
        assert_eq!(conn.next_id(), 2);
    }

    #[tokio::test]
    async fn silent_peer_is_no_response() {
        let (host, _device) = tokio::io::duplex(1024);
        let mut conn = AsyncConnection::open_with_config(
            host,
            ConnectionConfig {
                response_timeout: Duration::from_millis(10),
                ..ConnectionConfig::default()
            },
        );
        let err = conn
            .exchange_request("rd", params([("address", 1)]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NoResponse { .. }));
    }

    #[tokio::test]
    async fn late_reply_is_cleared_by_flush() {
        let (host, mut device) = tokio::io::duplex(1024);
        let mut conn = AsyncConnection::open_with_config(
            host,
            ConnectionConfig {
                response_timeout: Duration::from_millis(10),
                ..ConnectionConfig::default()
            },
        );

        let err = conn
            .exchange_request("reset", Params::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NoResponse { .. }));

        let mut request = [0u8; 512];
        let n = device.read(&mut request).await.unwrap();
        assert!(n > 0);
        device
            .write_all(br#"{"id":0,"result":"done"}"#)
            .await
            .unwrap();

        // Without the flush, id 1 would read the stale reply to id 0.
        assert_eq!(conn.flush_input().await, 24);

        let _device = spawn_echo_device(device);
        let resp = conn
            .exchange_request("wr", params([("address", 1u32), ("data", 9u32)]), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.id, 1);
        assert_eq!(resp.result, json!(9));
    }

    #[tokio::test]
    async fn closed_connection_skips() {
        let mut conn: AsyncConnection<DuplexStream> = AsyncConnection::closed();
        let out = conn
            .exchange_request("reset", Params::new(), None)
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(conn.next_id(), 1);
    }

    #[tokio::test]
    async fn shared_connection_serializes_tasks() {
        let (host, device) = tokio::io::duplex(1024);
        let _device = spawn_echo_device(device);
        let shared =
            SharedAsyncConnection::new(AsyncConnection::open_with_config(host, config()));

        let tasks: Vec<_> = (0..4u32)
            .map(|worker| {
                let shared = shared.clone();
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    for i in 0..3u32 {
                        let data = worker * 10 + i;
                        let data_params = params([("address", 1u32), ("data", data)]);
                        let resp = shared
                            .exchange_request("wr", data_params, None)
                            .await
                            .unwrap()
                            .unwrap();
                        assert_eq!(resp.result, json!(data));
                        ids.push(resp.id);
                    }
                    ids
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.extend(task.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<u64>>());
        assert_eq!(shared.lock().await.next_id(), 12);
    }
}
