use std::io::{ErrorKind, IoSlice, Write};

use scriptwire_transport::SocketStream;

use crate::codec::{encode_header, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Writes length-prefixed bodies to a blocking `Write` stream.
///
/// Headers and bodies go out together through `write_vectored`, so a body
/// is never copied into a staging buffer.
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Write one body with its header, then flush.
    pub fn send(&mut self, body: &[u8]) -> Result<()> {
        self.send_all(&[body])
    }

    /// Write several bodies back to back, then flush once.
    ///
    /// Every length is checked before anything is written, so an oversized
    /// body leaves the stream untouched.
    pub fn send_all<B: AsRef<[u8]>>(&mut self, bodies: &[B]) -> Result<()> {
        let mut headers: Vec<[u8; HEADER_SIZE]> = Vec::with_capacity(bodies.len());
        for body in bodies {
            let len = body.as_ref().len();
            if len > self.config.max_payload_size {
                return Err(FrameError::PayloadTooLarge {
                    size: len,
                    max: self.config.max_payload_size,
                });
            }
            headers.push(encode_header(len)?);
        }

        let mut parts: Vec<&[u8]> = Vec::with_capacity(bodies.len() * 2);
        for (header, body) in headers.iter().zip(bodies) {
            parts.push(header.as_slice());
            if !body.as_ref().is_empty() {
                parts.push(body.as_ref());
            }
        }

        self.write_parts(&parts)?;
        self.flush()
    }

    /// Write every byte of `parts` in order, resuming after short writes.
    /// `parts` must not contain empty slices.
    fn write_parts(&mut self, parts: &[&[u8]]) -> Result<()> {
        let mut rest = parts;
        let mut offset = 0usize;
        while let Some(first) = rest.first() {
            let slices: Vec<IoSlice<'_>> = std::iter::once(IoSlice::new(&first[offset..]))
                .chain(rest[1..].iter().map(|part| IoSlice::new(part)))
                .collect();

            let mut written = match self.inner.write_vectored(&slices) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            while let Some(part) = rest.first() {
                let left = part.len() - offset;
                if written < left {
                    offset += written;
                    break;
                }
                written -= left;
                offset = 0;
                rest = &rest[1..];
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<SocketStream> {
    /// Writer over a socket with the configured write timeout applied.
    pub fn with_config_socket(inner: SocketStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
