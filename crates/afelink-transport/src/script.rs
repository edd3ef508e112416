//! Scripted in-memory [`ByteSource`] for tests.
//!
//! Reads replay a queue of [`Step`]s; writes are recorded and may feed a
//! responder closure that queues the device's answer.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::source::{ByteSource, Chunk};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Step> + Send>;

/// One scripted read outcome.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver these bytes (split across reads if the buffer is smaller).
    Data(Bytes),
    /// Sleep, then deliver these bytes.
    Delayed(Duration, Bytes),
    /// Wait out the read timeout and report [`Chunk::TimedOut`].
    Stall,
    /// Fail the read with an I/O error of this kind.
    Fail(ErrorKind),
    /// Report end-of-stream.
    Close,
}

impl Step {
    pub fn data(bytes: impl AsRef<[u8]>) -> Self {
        Step::Data(Bytes::copy_from_slice(bytes.as_ref()))
    }

    pub fn delayed(delay: Duration, bytes: impl AsRef<[u8]>) -> Self {
        Step::Delayed(delay, Bytes::copy_from_slice(bytes.as_ref()))
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    writes: Vec<Bytes>,
    responder: Option<Responder>,
    fail_writes: bool,
    reads: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose reads replay `steps` in order.
    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Source that answers each write with the steps `responder` returns.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Step> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Append a step to the read queue.
    pub fn push(&mut self, step: Step) {
        self.steps.push_back(step);
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Each write call, in order.
    pub fn writes(&self) -> &[Bytes] {
        &self.writes
    }

    /// Every written byte, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|w| w.iter().copied()).collect()
    }

    /// Number of `read_chunk` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    fn deliver(&mut self, bytes: Bytes, buf: &mut [u8]) -> Chunk {
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        if n < bytes.len() {
            self.steps.push_front(Step::Data(bytes.slice(n..)));
        }
        Chunk::Data(n)
    }
}

impl ByteSource for ScriptedSource {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(TransportError::Io(std::io::Error::from(
                ErrorKind::BrokenPipe,
            )));
        }
        self.writes.push(Bytes::copy_from_slice(bytes));
        if let Some(responder) = self.responder.as_mut() {
            let answer = responder(bytes);
            self.steps.extend(answer);
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Chunk> {
        self.reads += 1;
        match self.steps.pop_front() {
            Some(Step::Data(bytes)) => Ok(self.deliver(bytes, buf)),
            Some(Step::Delayed(delay, bytes)) => {
                if delay >= timeout {
                    // The read gives up first; the bytes arrive for the next one.
                    std::thread::sleep(timeout);
                    self.steps
                        .push_front(Step::Delayed(delay - timeout, bytes));
                    return Ok(Chunk::TimedOut);
                }
                std::thread::sleep(delay);
                Ok(self.deliver(bytes, buf))
            }
            Some(Step::Stall) | None => {
                std::thread::sleep(timeout);
                Ok(Chunk::TimedOut)
            }
            Some(Step::Fail(kind)) => Err(TransportError::Io(std::io::Error::from(kind))),
            Some(Step::Close) => Ok(Chunk::Closed),
        }
    }

    fn discard_input(&mut self) -> Result<usize> {
        let mut discarded = 0usize;
        while let Some(step) = self.steps.front() {
            match step {
                Step::Data(bytes) => discarded += bytes.len(),
                Step::Stall => {}
                _ => break,
            }
            self.steps.pop_front();
        }
        Ok(discarded)
    }
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("pending_steps", &self.steps.len())
            .field("writes", &self.writes.len())
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}
