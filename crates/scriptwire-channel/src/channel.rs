//! The channel facade: submission, event handling and teardown.

use std::time::{Duration, Instant};

use bytes::Bytes;
use scriptwire_frame::{FrameError, Reassembler};
use scriptwire_transport::{Connection, ConnectionEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::correlator::{Callback, Correlator, ReplyOutcome};
use crate::error::{ChannelError, Result};
use crate::lifecycle::{EntryAction, Lifecycle, State};
use crate::target::ExecutionTarget;
use crate::value::{encode_call, to_compact_json, validate_identifier, Reply};

/// Running counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Requests accepted for sending.
    pub submitted: u64,
    /// Request frames written to the connection.
    pub sent: u64,
    /// Reply frames reassembled.
    pub received: u64,
    /// Replies dropped because no request was waiting.
    pub discarded: u64,
    /// Replies whose body was not JSON or `undefined`.
    pub decode_failures: u64,
    /// Requests dropped unanswered by a reset or connection failure.
    pub abandoned: u64,
}

/// An ordered request/response channel over one [`Connection`].
///
/// All traffic is gated on the connection being ready: requests submitted
/// earlier wait in order and are flushed when [`ConnectionEvent::Ready`]
/// arrives. Once the channel enters [`State::Error`], through a connection
/// failure or [`Channel::reset`], it stays there.
///
/// The channel never blocks on its own. Feed it connection signals through
/// [`Channel::handle_event`], or let [`Channel::pump`] wait for them.
pub struct Channel<C> {
    connection: C,
    config: ChannelConfig,
    lifecycle: Lifecycle,
    correlator: Correlator,
    reassembler: Reassembler,
    target: Option<Box<dyn ExecutionTarget>>,
    stats: ChannelStats,
}

impl<C: Connection> Channel<C> {
    pub fn new(connection: C, config: ChannelConfig) -> Self {
        let reassembler = Reassembler::with_max_payload(config.frame.max_payload_size);
        Self {
            connection,
            config,
            lifecycle: Lifecycle::new(),
            correlator: Correlator::new(),
            reassembler,
            target: None,
            stats: ChannelStats::default(),
        }
    }

    /// Attach the execution target that receives injected values.
    pub fn with_target(mut self, target: Box<dyn ExecutionTarget>) -> Self {
        self.target = Some(target);
        self
    }

    /// Ask the connection to open.
    ///
    /// Does nothing after the first call. If the attempt cannot be started
    /// the channel fails and the error is returned.
    pub fn start(&mut self) -> Result<()> {
        match self.lifecycle.start() {
            Some(action) => self.apply(action),
            None => Ok(()),
        }
    }

    /// React to one connection signal.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        if let Some(action) = self.lifecycle.on_event(event) {
            // Dispatch and Halt cannot fail; failures end in the Error state.
            let _ = self.apply(action);
        }
        if event == ConnectionEvent::DataAvailable {
            self.read_replies();
        }
    }

    /// Wait up to `timeout` for the next connection signal and handle it.
    ///
    /// Returns whether a signal was handled. A failed channel has nothing
    /// left to wait for and returns `Ok(false)` immediately.
    pub fn pump(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.state().is_terminal() {
            return Ok(false);
        }
        match self.connection.wait_event(timeout) {
            Ok(Some(event)) => {
                self.handle_event(event);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                warn!(error = %err, "waiting on connection failed");
                self.fail();
                Err(err.into())
            }
        }
    }

    /// Queue `payload` and hand its reply to `callback`.
    pub fn submit<F>(&mut self, payload: impl Into<Bytes>, callback: F) -> Result<()>
    where
        F: FnOnce(Reply) + 'static,
    {
        self.enqueue(payload.into(), Some(Box::new(callback)))
    }

    /// Queue `payload` and discard its reply.
    pub fn submit_detached(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(payload.into(), None)
    }

    /// Call `method` on the configured bridge object.
    ///
    /// The method name must be a plain identifier; anything else fails with
    /// [`ChannelError::Encoding`] and nothing is queued.
    pub fn call_remote_method<F>(&mut self, method: &str, args: &[Value], callback: F) -> Result<()>
    where
        F: FnOnce(Reply) + 'static,
    {
        let call = encode_call(&self.config.bridge_object, method, args)?;
        self.submit(call, callback)
    }

    /// Run a whole application script. `on_done` fires once the script's
    /// reply arrives, whatever its value.
    pub fn execute_application_script<F>(&mut self, script: impl Into<Bytes>, on_done: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        self.submit(script, move |reply| {
            if let Err(err) = reply {
                debug!(error = %err, "application script reply not decodable");
            }
            on_done();
        })
    }

    /// Bind `name` to `data` in the attached execution target.
    ///
    /// Nothing goes over the connection and no reply is expected.
    pub fn inject_value<T: Serialize + ?Sized>(&mut self, name: &str, data: &T) -> Result<()> {
        let target = self
            .target
            .as_mut()
            .ok_or(ChannelError::NoExecutionTarget)?;
        validate_identifier(name, true)?;
        let serialized = to_compact_json(data)?;

        target.set_value(name, &serialized);
        debug!(name, len = serialized.len(), "value injected");
        Ok(())
    }

    /// Close the connection and drop every pending request unanswered.
    ///
    /// The channel ends in [`State::Error`]; later replies are ignored and
    /// later submissions fail with [`ChannelError::Closed`].
    pub fn reset(&mut self) {
        info!(pending = self.correlator.awaiting(), "channel reset");
        self.fail();
        // Close even when already failed so the connection is released.
        self.connection.close();
    }

    /// Wait until the connection is ready.
    pub fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state() {
                State::Ready => return Ok(()),
                State::Error => return Err(ChannelError::Closed),
                State::Initial => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChannelError::Timeout(timeout));
            }
            self.pump(Some(remaining))?;
        }
    }

    /// Wait until every pending request has been answered.
    ///
    /// Fails with [`ChannelError::Closed`] if the channel goes down with
    /// requests still unanswered.
    pub fn wait_for_replies(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let abandoned = self.stats.abandoned;
        loop {
            if self.stats.abandoned > abandoned {
                return Err(ChannelError::Closed);
            }
            if self.correlator.awaiting() == 0 {
                return Ok(());
            }
            if self.state().is_terminal() {
                return Err(ChannelError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChannelError::Timeout(timeout));
            }
            self.pump(Some(remaining))?;
        }
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    /// Requests waiting for a reply, sent or not.
    pub fn pending(&self) -> usize {
        self.correlator.awaiting()
    }

    /// Requests not yet written to the connection.
    pub fn queued(&self) -> usize {
        self.correlator.queued()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    fn enqueue(&mut self, body: Bytes, callback: Option<Callback>) -> Result<()> {
        if self.state().is_terminal() {
            return Err(ChannelError::Closed);
        }
        let max = self.config.frame.max_payload_size;
        if body.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: body.len(),
                max,
            }
            .into());
        }

        self.correlator.enqueue(body, callback);
        self.stats.submitted += 1;
        self.flush();
        Ok(())
    }

    fn apply(&mut self, action: EntryAction) -> Result<()> {
        match action {
            EntryAction::Open => {
                if let Err(err) = self.connection.open() {
                    warn!(error = %err, "connection could not be opened");
                    self.fail();
                    return Err(err.into());
                }
            }
            EntryAction::Dispatch => self.flush(),
            EntryAction::Halt => self.halt(),
        }
        Ok(())
    }

    /// Send queued requests one at a time while the channel is ready.
    ///
    /// Drains the whole queue rather than one request per call: everything
    /// submitted before the connection opened goes out on the `Ready`
    /// transition, and no request is left waiting for a later submit.
    fn flush(&mut self) {
        while self.state() == State::Ready {
            match self.correlator.dispatch(&mut self.connection) {
                Ok(true) => self.stats.sent += 1,
                Ok(false) => break,
                Err(err) => {
                    warn!(error = %err, "request could not be written");
                    self.fail();
                    break;
                }
            }
        }
    }

    fn read_replies(&mut self) {
        if self.state().is_terminal() {
            return;
        }

        let Self {
            connection,
            reassembler,
            correlator,
            stats,
            ..
        } = self;
        let drained = reassembler.drain(connection, |body| {
            stats.received += 1;
            debug!(len = body.len(), "reply received");
            match correlator.complete_oldest(&body) {
                ReplyOutcome::Delivered | ReplyOutcome::Unclaimed => {}
                ReplyOutcome::DecodeFailed => stats.decode_failures += 1,
                ReplyOutcome::Desync => stats.discarded += 1,
            }
        });

        if let Err(err) = drained {
            warn!(error = %err, "inbound framing lost");
            self.fail();
        }
    }

    fn fail(&mut self) {
        if let Some(action) = self.lifecycle.halt() {
            let _ = self.apply(action);
        }
    }

    fn halt(&mut self) {
        let dropped = self.correlator.abandon();
        self.stats.abandoned += dropped as u64;
        self.reassembler.reset();
        self.connection.close();
        if dropped > 0 {
            warn!(dropped, "channel halted; pending requests abandoned");
        } else {
            info!("channel halted");
        }
    }
}

impl<C> std::fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.lifecycle.state())
            .field("pending", &self.correlator.awaiting())
            .field("stats", &self.stats)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}
