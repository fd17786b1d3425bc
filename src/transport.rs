//! The duplex byte channel the core reads and writes on.
//!
//! Everything about finding, opening, and configuring the underlying serial
//! port is outside the core's concern; callers hand the core an already-open
//! [`Transport`] and the core only ever calls the methods below.

use crate::error::{DcError, Result};

/// A byte-oriented duplex channel with timeout, drain, and flush.
///
/// Implementations are blocking: every method may suspend the calling
/// thread until data arrives, the timeout elapses, or the underlying I/O
/// fails. The core never performs its own yielding or async scheduling; an
/// embedder wanting concurrent downloads runs one session per thread.
pub trait Transport: Send {
    /// Write `buf` in full, or fail with [`DcError::IOError`].
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Read exactly `out.len()` bytes, or fail with [`DcError::TimeoutError`]
    /// if the deadline elapses first, or [`DcError::IOError`] on a hard
    /// transport failure.
    fn read(&mut self, out: &mut [u8]) -> Result<()>;

    /// Discard any bytes currently buffered on the read side.
    fn drain(&mut self) -> Result<()>;

    /// Flush the write side.
    fn flush(&mut self) -> Result<()>;

    /// Set the per-read timeout in milliseconds.
    fn set_timeout(&mut self, ms: u64);

    /// Block the calling thread for `ms` milliseconds.
    fn sleep(&self, ms: u64);
}

/// A scripted, in-memory [`Transport`] for tests: each entry is either a
/// canned response to hand back on the next `read`, or a forced error.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    enum Event {
        Response(Vec<u8>),
        Timeout,
        Io,
    }

    /// Replays a fixed sequence of responses/errors regardless of what was
    /// written, which is all the core's tests need: they assert on what the
    /// core *sends*, and separately control what it *receives*.
    pub struct MockTransport {
        events: VecDeque<Event>,
        pub written: Vec<Vec<u8>>,
        timeout_ms: u64,
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport {
                events: VecDeque::new(),
                written: Vec::new(),
                timeout_ms: 3000,
            }
        }

        pub fn push_response(&mut self, bytes: Vec<u8>) -> &mut Self {
            self.events.push_back(Event::Response(bytes));
            self
        }

        pub fn push_timeout(&mut self) -> &mut Self {
            self.events.push_back(Event::Timeout);
            self
        }

        pub fn push_io_error(&mut self) -> &mut Self {
            self.events.push_back(Event::Io);
            self
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, buf: &[u8]) -> Result<()> {
            self.written.push(buf.to_vec());
            Ok(())
        }

        fn read(&mut self, out: &mut [u8]) -> Result<()> {
            match self.events.pop_front() {
                Some(Event::Response(bytes)) => {
                    if bytes.len() != out.len() {
                        return Err(DcError::DataFormatError(format!(
                            "mock response length {} != requested {}",
                            bytes.len(),
                            out.len()
                        )));
                    }
                    out.copy_from_slice(&bytes);
                    Ok(())
                }
                Some(Event::Timeout) => Err(DcError::TimeoutError),
                Some(Event::Io) => Err(DcError::IOError(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock I/O failure",
                ))),
                None => Err(DcError::TimeoutError),
            }
        }

        fn drain(&mut self) -> Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_timeout(&mut self, ms: u64) {
            self.timeout_ms = ms;
        }

        fn sleep(&self, _ms: u64) {}
    }
}
