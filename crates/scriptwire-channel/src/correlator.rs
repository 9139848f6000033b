//! Pairs inbound replies with outbound requests by position.
//!
//! Two queues move in lockstep: request bodies waiting to be sent, and one
//! callback slot per request waiting for its reply. A body leaves the first
//! queue when it is written; its slot leaves the second when the next reply
//! arrives. No identifier travels on the wire.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use scriptwire_frame::encode_frame;
use scriptwire_transport::Connection;
use tracing::{debug, warn};

use crate::error::Result;
use crate::value::{decode_reply, Reply};

/// Invoked with the reply to one request.
pub type Callback = Box<dyn FnOnce(Reply)>;

/// What happened to a completed reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Decoded and handed to its callback.
    Delivered,
    /// Handed to its callback as a decode error.
    DecodeFailed,
    /// Matched a request submitted without a callback.
    Unclaimed,
    /// No request was waiting; the reply was dropped.
    Desync,
}

/// FIFO request/callback queues.
pub struct Correlator {
    requests: VecDeque<Bytes>,
    callbacks: VecDeque<Option<Callback>>,
    scratch: BytesMut,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            callbacks: VecDeque::new(),
            scratch: BytesMut::new(),
        }
    }

    /// Queue a request and its callback slot together.
    pub fn enqueue(&mut self, body: Bytes, callback: Option<Callback>) {
        self.requests.push_back(body);
        self.callbacks.push_back(callback);
    }

    /// Send the oldest queued request, if the connection can take it.
    ///
    /// Sends at most one frame per call and returns whether it did. An
    /// unready connection or an empty queue is not an error.
    pub fn dispatch<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<bool> {
        if !conn.is_ready() {
            return Ok(false);
        }
        let Some(body) = self.requests.pop_front() else {
            return Ok(false);
        };

        self.scratch.clear();
        encode_frame(&body, &mut self.scratch)?;
        conn.write(&self.scratch)?;
        debug!(
            len = body.len(),
            queued = self.requests.len(),
            "request dispatched"
        );
        Ok(true)
    }

    /// Resolve the oldest callback slot with `body`.
    pub fn complete_oldest(&mut self, body: &[u8]) -> ReplyOutcome {
        let Some(slot) = self.callbacks.pop_front() else {
            warn!(
                len = body.len(),
                "reply received with no pending request; discarding"
            );
            return ReplyOutcome::Desync;
        };
        let Some(callback) = slot else {
            return ReplyOutcome::Unclaimed;
        };

        let reply = decode_reply(body);
        let outcome = match &reply {
            Ok(_) => ReplyOutcome::Delivered,
            Err(err) => {
                warn!(error = %err, len = body.len(), "reply could not be decoded");
                ReplyOutcome::DecodeFailed
            }
        };
        callback(reply);
        outcome
    }

    /// Drop every queued request and callback without invoking anything.
    /// Returns how many callback slots were dropped.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.callbacks.len();
        self.requests.clear();
        self.callbacks.clear();
        dropped
    }

    /// Requests not yet written to the connection.
    pub fn queued(&self) -> usize {
        self.requests.len()
    }

    /// Requests still waiting for a reply, sent or not.
    pub fn awaiting(&self) -> usize {
        self.callbacks.len()
    }

    /// Requests written but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.callbacks.len().saturating_sub(self.requests.len())
    }
}
