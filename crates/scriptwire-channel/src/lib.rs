//! Ordered request/response channel between a native host and a script
//! runtime.
//!
//! A [`Channel`] queues outbound calls, sends them as frames once its
//! connection is ready, and hands each inbound reply to the callback of the
//! oldest unanswered request. Replies carry no identifier: the Nth reply
//! belongs to the Nth request sent, so the runtime on the other end must
//! answer in order. [`ScriptHost`] is that other end, and it keeps replies in
//! order even when its [`ExecutionTarget`] completes out of order.

pub mod channel;
pub mod config;
#[cfg(unix)]
pub mod connector;
pub mod correlator;
pub mod error;
pub mod host;
pub mod lifecycle;
#[cfg(unix)]
pub mod listener;
pub mod target;
pub mod value;

pub use channel::{Channel, ChannelStats};
pub use config::{ChannelConfig, DEFAULT_BRIDGE_OBJECT};
pub use correlator::{Callback, Correlator, ReplyOutcome};
pub use error::{ChannelError, Result};
pub use host::ScriptHost;
pub use lifecycle::{transition, EntryAction, Lifecycle, State};
pub use target::{Completion, EchoEngine, ExecutionTarget};
pub use value::{decode_reply, encode_argument, encode_call, Reply, UNDEFINED};

#[cfg(unix)]
pub use connector::{connect, connect_with_config};
#[cfg(unix)]
pub use listener::HostListener;
