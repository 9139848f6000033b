use std::time::Duration;

use scriptwire_frame::FrameConfig;

/// Object on the script side that receives method calls.
pub const DEFAULT_BRIDGE_OBJECT: &str = "__fbBatchedBridge";

/// Channel behavior configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Framing limits. Requests above `max_payload_size` are rejected at
    /// submission; replies above it fail the channel.
    pub frame: FrameConfig,
    /// Receiver object prefixed to every method call.
    pub bridge_object: String,
    /// How long `connect` waits for the connection to become ready.
    pub open_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            bridge_object: DEFAULT_BRIDGE_OBJECT.to_string(),
            open_timeout: Duration::from_secs(5),
        }
    }
}
