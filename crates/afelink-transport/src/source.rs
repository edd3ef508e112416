use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Smallest read timeout handed to the OS. A zero timeout means "block
/// forever" (or is rejected outright) on most platforms.
pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

const DISCARD_POLL: Duration = Duration::from_millis(1);
const MAX_DISCARD_READS: usize = 64;

/// Outcome of a single bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// `n` bytes were placed at the front of the buffer.
    Data(usize),
    /// Nothing arrived within the timeout.
    TimedOut,
    /// The stream reached end-of-file.
    Closed,
}

/// A duplex byte channel with bounded-time reads.
///
/// Implementations must return from [`read_chunk`](ByteSource::read_chunk)
/// once `timeout` elapses without data. A read that times out leaves nothing
/// pending: the next call starts a fresh read.
pub trait ByteSource {
    /// Write all of `bytes` and flush.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`, waiting at most `timeout`.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Chunk>;

    /// Drop any bytes already buffered on the input side.
    ///
    /// Returns how many bytes were discarded. The default drains with short
    /// polling reads, capped so a chattering peer cannot hold the caller.
    fn discard_input(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 256];
        let mut discarded = 0usize;
        for _ in 0..MAX_DISCARD_READS {
            match self.read_chunk(&mut scratch, DISCARD_POLL)? {
                Chunk::Data(n) => discarded += n,
                Chunk::TimedOut | Chunk::Closed => break,
            }
        }
        Ok(discarded)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(bytes)
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Chunk> {
        (**self).read_chunk(buf, timeout)
    }

    fn discard_input(&mut self) -> Result<usize> {
        (**self).discard_input()
    }
}

/// Streams whose blocking reads can be bounded by a timeout.
pub trait ReadTimeout {
    fn apply_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

#[cfg(unix)]
impl ReadTimeout for std::os::unix::net::UnixStream {
    fn apply_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }
}

impl ReadTimeout for std::net::TcpStream {
    fn apply_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }
}

/// Adapts any blocking `Read + Write` stream into a [`ByteSource`].
///
/// The OS read timeout is only touched when the requested timeout changes.
pub struct StreamSource<T> {
    inner: T,
    applied_timeout: Option<Duration>,
}

impl<T> StreamSource<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            applied_timeout: None,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write + ReadTimeout> ByteSource for StreamSource<T> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        write_all_retrying(&mut self.inner, bytes)
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Chunk> {
        if buf.is_empty() {
            return Ok(Chunk::Data(0));
        }

        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if self.applied_timeout != Some(timeout) {
            self.inner.apply_read_timeout(timeout)?;
            self.applied_timeout = Some(timeout);
        }

        read_retrying(&mut self.inner, buf)
    }
}

impl<T> std::fmt::Debug for StreamSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("applied_timeout", &self.applied_timeout)
            .finish_non_exhaustive()
    }
}

/// One read that maps timeout-flavoured errors to [`Chunk::TimedOut`].
pub(crate) fn read_retrying<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<Chunk> {
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(Chunk::Closed),
            Ok(n) => return Ok(Chunk::Data(n)),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Ok(Chunk::TimedOut)
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

pub(crate) fn write_all_retrying<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match writer.write(&bytes[offset..]) {
            Ok(0) => {
                return Err(TransportError::WriteClosed {
                    written: offset,
                    len: bytes.len(),
                })
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}
