use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Connection, ConnectionEvent, SocketStream};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Non-blocking Unix domain socket client implementing [`Connection`].
///
/// Inbound bytes are pulled off the socket when [`Connection::wait_event`]
/// observes readability and are then handed out by `read`. Outbound bytes
/// that the socket cannot take immediately stay queued and are flushed as
/// soon as the socket becomes writable again.
pub struct UdsConnection {
    path: PathBuf,
    stream: Option<UnixStream>,
    inbound: BytesMut,
    outbound: BytesMut,
    events: VecDeque<ConnectionEvent>,
    failed: bool,
}

impl UdsConnection {
    /// Create a connection to `path`. Nothing happens until `open`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            stream: None,
            inbound: BytesMut::with_capacity(READ_CHUNK_SIZE),
            outbound: BytesMut::new(),
            events: VecDeque::new(),
            failed: false,
        }
    }

    /// The socket path this connection targets.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written but not yet accepted by the socket.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Pull everything the socket has ready. Returns bytes read and whether
    /// the peer closed its end.
    fn fill_inbound(&mut self) -> Result<(usize, bool)> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        let mut total = 0usize;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Ok((total, true)),
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok((total, false)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn flush_outbound(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => return Err(TransportError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => self.outbound.advance(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn fail(&mut self, reason: &dyn std::fmt::Display) -> ConnectionEvent {
        warn!(path = ?self.path, %reason, "unix socket connection failed");
        self.failed = true;
        ConnectionEvent::Error
    }
}

impl Connection for UdsConnection {
    fn is_ready(&self) -> bool {
        self.stream.is_some() && !self.failed
    }

    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = UnixStream::connect(&self.path).map_err(|source| TransportError::Connect {
            path: self.path.clone(),
            source,
        })?;
        stream.set_nonblocking(true)?;
        debug!(path = ?self.path, "connected to unix domain socket");

        self.stream = Some(stream);
        self.failed = false;
        self.events.push_back(ConnectionEvent::Ready);
        Ok(())
    }

    fn bytes_available(&self) -> usize {
        self.inbound.len()
    }

    fn read(&mut self, max: usize) -> Result<Bytes> {
        if self.stream.is_none() {
            return Err(TransportError::NotOpen);
        }
        let n = max.min(self.inbound.len());
        Ok(self.inbound.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_ready() {
            return Err(TransportError::NotOpen);
        }
        self.outbound.extend_from_slice(data);
        self.flush_outbound()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!(path = ?self.path, "closed unix domain socket connection");
        }
        self.inbound.clear();
        self.outbound.clear();
        self.events.clear();
        self.failed = false;
    }

    fn wait_event(&mut self, timeout: Option<Duration>) -> Result<Option<ConnectionEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        let Some(fd) = self.raw_fd() else {
            return Ok(None);
        };
        if self.failed {
            return Ok(None);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let mut interest = libc::POLLIN;
            if !self.outbound.is_empty() {
                interest |= libc::POLLOUT;
            }

            let revents = poll_fd(fd, interest, poll_timeout_ms(deadline))?;

            if revents & libc::POLLNVAL != 0 {
                return Ok(Some(self.fail(&"socket descriptor invalid")));
            }

            if revents & libc::POLLOUT != 0 {
                if let Err(err) = self.flush_outbound() {
                    return Ok(Some(self.fail(&err)));
                }
            }

            if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                match self.fill_inbound() {
                    Ok((read, true)) => {
                        let event = self.fail(&"peer closed the connection");
                        if read > 0 {
                            self.events.push_back(event);
                            return Ok(Some(ConnectionEvent::DataAvailable));
                        }
                        return Ok(Some(event));
                    }
                    Ok((0, false)) => {}
                    Ok((_, false)) => return Ok(Some(ConnectionEvent::DataAvailable)),
                    Err(err) => return Ok(Some(self.fail(&err))),
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
        }
    }
}

impl std::fmt::Debug for UdsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsConnection")
            .field("path", &self.path)
            .field("open", &self.stream.is_some())
            .field("failed", &self.failed)
            .field("inbound", &self.inbound.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

fn poll_timeout_ms(deadline: Option<Instant>) -> libc::c_int {
    match deadline {
        None => -1,
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let millis = remaining.as_micros().div_ceil(1000);
            libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
        }
    }
}

fn poll_fd(fd: RawFd, events: libc::c_short, timeout_ms: libc::c_int) -> Result<libc::c_short> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of 1.
        // `fd` belongs to a stream owned by the caller for the whole call.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(err));
        }
        return Ok(if rc == 0 { 0 } else { pfd.revents });
    }
}

/// Listening Unix domain socket for script hosts.
///
/// The socket file is created on bind and removed again on drop, provided
/// the path still refers to the socket this listener created.
pub struct UdsListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl UdsListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind and listen on `path` with owner-only permissions.
    ///
    /// A stale socket file at `path` is removed first; any other kind of file
    /// is left alone and binding fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen on `path` with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "script host listening on unix domain socket");

        Ok(Self {
            listener,
            created_inode: (metadata.dev(), metadata.ino()),
            path,
        })
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<SocketStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(SocketStream::from_unix(stream))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        let (dev, ino) = self.created_inode;
        if metadata.file_type().is_socket() && metadata.dev() == dev && metadata.ino() == ino {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}
