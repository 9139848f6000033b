use std::time::Duration;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] scriptwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] scriptwire_frame::FrameError),

    /// A call or value could not be turned into a payload.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A reply body was neither JSON nor `undefined`.
    #[error("reply is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    /// `inject_value` was called on a channel without an execution target.
    #[error("no execution target attached to channel")]
    NoExecutionTarget,

    /// The channel has failed or been reset and accepts no more requests.
    #[error("channel closed")]
    Closed,

    /// Waiting on the channel took longer than allowed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
