use std::path::Path;

use scriptwire_frame::FrameConfig;
use scriptwire_transport::{SocketStream, UdsListener};

use crate::error::Result;
use crate::host::ScriptHost;
use crate::target::ExecutionTarget;

/// Accepts channel connections and serves each with a [`ScriptHost`].
pub struct HostListener {
    socket: UdsListener,
    frame_config: FrameConfig,
}

impl HostListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let socket = UdsListener::bind(path)?;
        Ok(Self {
            socket,
            frame_config: FrameConfig::default(),
        })
    }

    /// Override framing limits and timeouts for accepted hosts.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Accept the next connection (blocking) and bind it to `target`.
    pub fn accept<T: ExecutionTarget>(
        &self,
        target: T,
    ) -> Result<ScriptHost<SocketStream, SocketStream, T>> {
        let stream = self.socket.accept()?;
        ScriptHost::over_socket(stream, target, self.frame_config.clone())
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}
