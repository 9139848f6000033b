//! Ordered, length-framed request/response channel between a native host and
//! a script runtime.
//!
//! Requests are script text, replies are JSON (or `undefined`), and every
//! message travels as a native-order `u32` length followed by its body.
//! Replies carry no identifier; they are matched to requests by order.
//!
//! # Crate Structure
//!
//! - [`transport`]: connections and readiness events (Unix sockets, in-memory)
//! - [`frame`]: length-prefixed framing and incremental reassembly
//! - [`channel`]: request correlation, connection lifecycle and the script
//!   host side (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use scriptwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use scriptwire_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use scriptwire_channel::*;
}
