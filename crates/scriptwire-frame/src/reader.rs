use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use scriptwire_transport::SocketStream;

use crate::codec::{body_len, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads length-prefixed bodies from a blocking `Read` stream.
///
/// Each read takes the 4-byte header, checks the announced length against
/// `max_payload_size` and then takes exactly that many body bytes. Nothing
/// past the current body is pulled from the stream.
///
/// A read timeout that fires partway through a body leaves the stream out of
/// step with the framing, so the caller should drop the connection.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Read the next body, or `Ok(None)` if the stream ended cleanly before
    /// a new header started.
    ///
    /// End of stream inside a header or body is
    /// `Err(FrameError::ConnectionClosed)`.
    pub fn next_body(&mut self) -> Result<Option<Bytes>> {
        let mut header = [0u8; HEADER_SIZE];
        if !self.fill(&mut header, true)? {
            return Ok(None);
        }

        let len = body_len(header);
        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        let mut body = BytesMut::zeroed(len);
        self.fill(&mut body, false)?;
        Ok(Some(body.freeze()))
    }

    /// Read the next body, treating any end of stream as
    /// `Err(FrameError::ConnectionClosed)`.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        self.next_body()?.ok_or(FrameError::ConnectionClosed)
    }

    /// Fill `dst` completely. With `eof_ok`, an end of stream before the
    /// first byte returns `Ok(false)`.
    fn fill(&mut self, dst: &mut [u8], eof_ok: bool) -> Result<bool> {
        let mut filled = 0usize;
        while filled < dst.len() {
            match self.inner.read(&mut dst[filled..]) {
                Ok(0) if filled == 0 && eof_ok => return Ok(false),
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(true)
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<SocketStream> {
    /// Reader over a socket with the configured read timeout applied.
    pub fn with_config_socket(inner: SocketStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
