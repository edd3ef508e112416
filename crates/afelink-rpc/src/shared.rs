use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use afelink_transport::ByteSource;

use crate::connection::{Connection, Exchange};
use crate::envelope::Params;
use crate::error::Result;
use crate::response::Response;

/// A [`Connection`] that several callers can hold at once.
///
/// Every exchange takes the lock for the whole write-then-read, which keeps
/// the one-request-in-flight rule intact. Use [`with`](SharedConnection::with)
/// to run a sequence (read-modify-write) without other callers interleaving.
pub struct SharedConnection<S> {
    inner: Arc<Mutex<Connection<S>>>,
}

impl<S: ByteSource> SharedConnection<S> {
    pub fn new(conn: Connection<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with<T>(&self, f: impl FnOnce(&mut Connection<S>) -> T) -> T {
        f(&mut self.lock())
    }

    pub fn exchange_request(
        &self,
        method: &str,
        params: Params,
        explicit_id: Option<u64>,
    ) -> Result<Option<Response>> {
        self.lock().exchange_request(method, params, explicit_id)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    // Poisoning is ignored: a reply left behind by a panicked caller
    // surfaces as an id mismatch on the next exchange.
    fn lock(&self) -> MutexGuard<'_, Connection<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Clone for SharedConnection<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ByteSource> Exchange for SharedConnection<S> {
    fn exchange_request(
        &mut self,
        method: &str,
        params: Params,
        explicit_id: Option<u64>,
    ) -> Result<Option<Response>> {
        SharedConnection::exchange_request(self, method, params, explicit_id)
    }
}

impl<S: ByteSource> From<Connection<S>> for SharedConnection<S> {
    fn from(conn: Connection<S>) -> Self {
        Self::new(conn)
    }
}

impl<S> std::fmt::Debug for SharedConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
