//! Byte connections for scriptwire.
//!
//! This is the lowest layer of scriptwire. It provides:
//! - The [`Connection`] trait consumed by the channel layer: non-blocking
//!   reads and writes plus readiness signalled as [`ConnectionEvent`]s
//! - [`UdsConnection`], a non-blocking Unix domain socket client
//! - [`UdsListener`] and [`SocketStream`], the blocking server side used by
//!   script hosts
//! - [`MemoryConnection`], an in-process connection for tests and embedding

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::{memory_pair, MemoryConnection, MemoryRemote};
pub use traits::{Connection, ConnectionEvent, SocketStream};

#[cfg(unix)]
pub use uds::{UdsConnection, UdsListener};
