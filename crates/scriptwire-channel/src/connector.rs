use std::path::Path;

use scriptwire_transport::UdsConnection;
use tracing::debug;

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::Result;

/// Connect to a script host and wait until the channel is ready.
pub fn connect(path: impl AsRef<Path>) -> Result<Channel<UdsConnection>> {
    connect_with_config(path, ChannelConfig::default())
}

/// Connect with explicit configuration.
///
/// Waits at most `config.open_timeout` for the connection to become ready.
pub fn connect_with_config(
    path: impl AsRef<Path>,
    config: ChannelConfig,
) -> Result<Channel<UdsConnection>> {
    let timeout = config.open_timeout;
    let mut channel = Channel::new(UdsConnection::new(path.as_ref()), config);
    channel.start()?;
    channel.wait_until_ready(timeout)?;
    debug!(path = ?path.as_ref(), "channel ready");
    Ok(channel)
}
