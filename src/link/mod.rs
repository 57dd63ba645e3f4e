//! # Serial Link Module
//!
//! Byte-level plumbing between the physical link and the transfer protocol.
//!
//! ## Features
//!
//! - **SLIP Codec**: Incremental decoder and one-shot encoder ([`slip`])
//! - **Byte Sources**: Non-blocking [`ByteSource`] over a serial port or any reader
//! - **Responders**: Blocking [`Responder`] for the 3-byte status replies
//!
//! The protocol layer never touches a device directly; it only sees these two
//! traits, so tests drive it with in-memory queues.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};

#[cfg(feature = "serial")]
pub mod serial;
pub mod slip;

#[cfg(feature = "serial")]
pub use serial::SerialLink;

/// Source of raw link bytes with non-blocking poll semantics.
pub trait ByteSource {
    /// Next available byte, or `Ok(None)` when nothing is waiting right now.
    fn poll_byte(&mut self) -> io::Result<Option<u8>>;

    /// True once the source can never yield another byte (end of a capture
    /// file). Live links never run dry.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Outbound side of the link, used for status replies.
pub trait Responder {
    /// Send one byte, blocking until the link accepts it.
    fn send_byte(&mut self, byte: u8) -> io::Result<()>;

    fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            self.send_byte(b)?;
        }
        Ok(())
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).poll_byte()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

impl<T: Responder + ?Sized> Responder for Box<T> {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).send_byte(byte)
    }

    fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send_all(bytes)
    }
}

impl ByteSource for VecDeque<u8> {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.pop_front())
    }

    fn is_exhausted(&self) -> bool {
        self.is_empty()
    }
}

impl Responder for Vec<u8> {
    fn send_byte(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }
}

/// Responder for deployments without sender-side flow control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResponder;

impl Responder for NullResponder {
    fn send_byte(&mut self, _byte: u8) -> io::Result<()> {
        Ok(())
    }
}

/// Serves bytes from any reader, e.g. a captured link stream on disk.
pub struct ReaderSource<R> {
    inner: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    eof: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self::with_buffer(inner, 4096)
    }

    pub fn with_buffer(inner: R, size: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; size.max(1)].into_boxed_slice(),
            pos: 0,
            len: 0,
            eof: false,
        }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        if self.pos < self.len {
            let b = self.buf[self.pos];
            self.pos += 1;
            return Ok(Some(b));
        }
        if self.eof {
            return Ok(None);
        }
        match self.inner.read(&mut self.buf) {
            Ok(0) => {
                self.eof = true;
                Ok(None)
            }
            Ok(n) => {
                self.len = n;
                self.pos = 1;
                Ok(Some(self.buf[0]))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.eof && self.pos >= self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_source_yields_all_bytes_then_exhausts() {
        let data: Vec<u8> = (0..10).collect();
        let mut src = ReaderSource::with_buffer(Cursor::new(data.clone()), 3);
        let mut out = Vec::new();
        while let Some(b) = src.poll_byte().unwrap() {
            out.push(b);
        }
        assert_eq!(out, data);
        assert!(src.is_exhausted());
        assert_eq!(src.poll_byte().unwrap(), None);
    }

    #[test]
    fn vec_responder_records_bytes() {
        let mut out = Vec::new();
        out.send_all(b"ACK").unwrap();
        assert_eq!(out, b"ACK");
    }
}
