//! In-process connection pair.
//!
//! [`MemoryConnection`] is the local end handed to a channel; [`MemoryRemote`]
//! plays the counterparty, feeding inbound bytes, reading what was written
//! and raising readiness signals. Both ends share state on one thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{Connection, ConnectionEvent};

#[derive(Default)]
struct Shared {
    open_requested: bool,
    ready: bool,
    closed: bool,
    inbound: BytesMut,
    outbound: BytesMut,
    events: VecDeque<ConnectionEvent>,
}

/// Local end of an in-memory connection.
pub struct MemoryConnection {
    shared: Rc<RefCell<Shared>>,
}

/// Remote end of an in-memory connection.
#[derive(Clone)]
pub struct MemoryRemote {
    shared: Rc<RefCell<Shared>>,
}

/// Create a connected in-memory pair. The connection starts closed; the
/// remote decides when it becomes ready.
pub fn memory_pair() -> (MemoryConnection, MemoryRemote) {
    let shared = Rc::new(RefCell::new(Shared::default()));
    (
        MemoryConnection {
            shared: Rc::clone(&shared),
        },
        MemoryRemote { shared },
    )
}

impl Connection for MemoryConnection {
    fn is_ready(&self) -> bool {
        let shared = self.shared.borrow();
        shared.ready && !shared.closed
    }

    fn open(&mut self) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        shared.open_requested = true;
        shared.closed = false;
        Ok(())
    }

    fn bytes_available(&self) -> usize {
        self.shared.borrow().inbound.len()
    }

    fn read(&mut self, max: usize) -> Result<Bytes> {
        let mut shared = self.shared.borrow_mut();
        if shared.closed {
            return Err(TransportError::NotOpen);
        }
        let n = max.min(shared.inbound.len());
        Ok(shared.inbound.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        if !shared.ready || shared.closed {
            return Err(TransportError::NotOpen);
        }
        shared.outbound.extend_from_slice(data);
        trace!(len = data.len(), "memory connection write");
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.closed = true;
        shared.ready = false;
        shared.inbound.clear();
        shared.events.clear();
    }

    fn wait_event(&mut self, _timeout: Option<Duration>) -> Result<Option<ConnectionEvent>> {
        let mut shared = self.shared.borrow_mut();
        if shared.closed {
            return Ok(None);
        }
        Ok(shared.events.pop_front())
    }
}

impl MemoryRemote {
    /// Whether the local end has called `open`.
    pub fn open_requested(&self) -> bool {
        self.shared.borrow().open_requested
    }

    /// Whether the local end has called `close`.
    pub fn is_closed(&self) -> bool {
        self.shared.borrow().closed
    }

    /// Mark the connection ready and raise [`ConnectionEvent::Ready`].
    pub fn accept(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.ready = true;
        shared.events.push_back(ConnectionEvent::Ready);
    }

    /// Fail the connection and raise [`ConnectionEvent::Error`].
    pub fn fail(&self) {
        let mut shared = self.shared.borrow_mut();
        shared.ready = false;
        shared.events.push_back(ConnectionEvent::Error);
    }

    /// Deliver bytes to the local end and raise
    /// [`ConnectionEvent::DataAvailable`].
    pub fn send(&self, data: &[u8]) {
        let mut shared = self.shared.borrow_mut();
        if shared.closed {
            return;
        }
        shared.inbound.extend_from_slice(data);
        shared.events.push_back(ConnectionEvent::DataAvailable);
    }

    /// Take everything the local end has written so far.
    pub fn take_written(&self) -> Bytes {
        self.shared.borrow_mut().outbound.split().freeze()
    }

    /// Signals raised but not yet consumed by the local end.
    pub fn pending_events(&self) -> usize {
        self.shared.borrow().events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_then_accept_raises_ready() {
        let (mut conn, remote) = memory_pair();
        assert!(!conn.is_ready());

        conn.open().unwrap();
        assert!(remote.open_requested());
        assert!(!conn.is_ready());

        remote.accept();
        assert!(conn.is_ready());
        assert_eq!(
            conn.wait_event(Some(Duration::ZERO)).unwrap(),
            Some(ConnectionEvent::Ready)
        );
        assert_eq!(conn.wait_event(Some(Duration::ZERO)).unwrap(), None);
    }

    #[test]
    fn reads_are_bounded_by_available_bytes() {
        let (mut conn, remote) = memory_pair();
        conn.open().unwrap();
        remote.accept();
        remote.send(b"abcdef");

        assert_eq!(conn.bytes_available(), 6);
        assert_eq!(conn.read(4).unwrap().as_ref(), b"abcd");
        assert_eq!(conn.read(10).unwrap().as_ref(), b"ef");
        assert!(conn.read(10).unwrap().is_empty());
    }

    #[test]
    fn writes_accumulate_in_order() {
        let (mut conn, remote) = memory_pair();
        conn.open().unwrap();
        remote.accept();

        conn.write(b"one").unwrap();
        conn.write(b"two").unwrap();
        assert_eq!(remote.take_written().as_ref(), b"onetwo");
        assert!(remote.take_written().is_empty());
    }

    #[test]
    fn write_before_ready_is_rejected() {
        let (mut conn, _remote) = memory_pair();
        conn.open().unwrap();
        assert!(matches!(conn.write(b"x"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn close_drops_pending_signals_and_data() {
        let (mut conn, remote) = memory_pair();
        conn.open().unwrap();
        remote.accept();
        remote.send(b"late");

        conn.close();
        assert!(remote.is_closed());
        assert!(!conn.is_ready());
        assert_eq!(conn.bytes_available(), 0);
        assert_eq!(conn.wait_event(None).unwrap(), None);

        remote.send(b"after-close");
        assert_eq!(remote.pending_events(), 0);
    }

    #[test]
    fn fail_raises_error() {
        let (mut conn, remote) = memory_pair();
        conn.open().unwrap();
        remote.accept();
        remote.fail();

        assert!(!conn.is_ready());
        assert_eq!(conn.wait_event(None).unwrap(), Some(ConnectionEvent::Ready));
        assert_eq!(conn.wait_event(None).unwrap(), Some(ConnectionEvent::Error));
    }
}
