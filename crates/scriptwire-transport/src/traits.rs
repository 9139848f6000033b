use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// Signals raised by a [`Connection`].
///
/// The channel layer dispatches every signal through a single handler, so
/// these are plain values rather than registered callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// The connection finished opening and can carry traffic.
    Ready,
    /// The connection failed or the remote end went away.
    Error,
    /// New inbound bytes are buffered and can be read.
    DataAvailable,
}

impl ConnectionEvent {
    /// Short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Error => "error",
            Self::DataAvailable => "data-available",
        }
    }
}

/// A duplex byte connection driven by readiness events.
///
/// Reads and writes never suspend: `read` hands out at most what is already
/// buffered, and `write` queues bytes for delivery in order. Only
/// [`Connection::wait_event`] may block, and only up to its timeout.
pub trait Connection {
    /// Whether the connection is open and able to carry traffic.
    fn is_ready(&self) -> bool;

    /// Begin opening the connection.
    ///
    /// Completion is reported as [`ConnectionEvent::Ready`] or
    /// [`ConnectionEvent::Error`]; an `Err` here means the attempt could not
    /// even be started.
    fn open(&mut self) -> Result<()>;

    /// Number of inbound bytes that can be read without waiting.
    fn bytes_available(&self) -> usize;

    /// Read up to `max` buffered bytes. Returns fewer (possibly zero) when
    /// less is available.
    fn read(&mut self, max: usize) -> Result<Bytes>;

    /// Queue `data` for delivery. Bytes from successive writes are delivered
    /// in call order.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Close the connection and drop anything buffered.
    fn close(&mut self);

    /// Wait for the next signal.
    ///
    /// `None` timeout waits indefinitely; `Some(Duration::ZERO)` only reports
    /// signals that are already pending. Returns `Ok(None)` when the timeout
    /// expires or the connection is closed.
    fn wait_event(&mut self, timeout: Option<Duration>) -> Result<Option<ConnectionEvent>>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn bytes_available(&self) -> usize {
        (**self).bytes_available()
    }

    fn read(&mut self, max: usize) -> Result<Bytes> {
        (**self).read(max)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn wait_event(&mut self, timeout: Option<Duration>) -> Result<Option<ConnectionEvent>> {
        (**self).wait_event(timeout)
    }
}

/// A connected, blocking socket stream. Implements `Read + Write`.
///
/// This is what a script host serves requests over. On Unix it wraps a
/// Unix domain socket stream.
pub struct SocketStream {
    inner: SocketStreamInner,
}

enum SocketStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl SocketStream {
    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SocketStreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Clone the stream so one half can read while the other writes.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }
}

impl std::fmt::Debug for SocketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            SocketStreamInner::Unix(_) => {
                f.debug_struct("SocketStream").field("type", &"unix").finish()
            }
        }
    }
}
