//! The script runtime's end of a channel.
//!
//! A [`ScriptHost`] reads request frames, runs each through its
//! [`ExecutionTarget`] and writes the results back as reply frames. Channels
//! match replies to requests by position only, so replies leave the host in
//! the order their requests arrived, even when the target completes them in
//! another order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::rc::Rc;

use bytes::Bytes;
use scriptwire_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use scriptwire_transport::SocketStream;
use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};
use crate::target::ExecutionTarget;

/// Completed replies waiting for their turn on the wire.
#[derive(Debug, Default)]
struct Outbox {
    next_to_send: u64,
    ready: BTreeMap<u64, Bytes>,
}

/// Serves requests from one channel connection.
pub struct ScriptHost<R, W, T> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    target: T,
    outbox: Rc<RefCell<Outbox>>,
    next_seq: u64,
}

impl<R: Read, W: Write, T: ExecutionTarget> ScriptHost<R, W, T> {
    /// Build a host from already-configured frame endpoints.
    pub fn from_parts(reader: FrameReader<R>, writer: FrameWriter<W>, target: T) -> Self {
        Self {
            reader,
            writer,
            target,
            outbox: Rc::default(),
            next_seq: 0,
        }
    }

    /// Read one request, run it and write every reply that is now in turn.
    ///
    /// Blocks until a request arrives. Returns `Ok(false)` if the channel
    /// side closed the connection between requests instead.
    pub fn serve_one(&mut self) -> Result<bool> {
        let Some(payload) = self.reader.next_body()? else {
            return Ok(false);
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(seq, len = payload.len(), "request received");

        let outbox = Rc::clone(&self.outbox);
        self.target.run(
            payload,
            Box::new(move |reply| {
                outbox.borrow_mut().ready.insert(seq, reply);
            }),
        );

        self.flush_replies()?;
        Ok(true)
    }

    /// Write completed replies in request order, stopping at the first one
    /// still outstanding. Returns how many were written.
    ///
    /// Call this after releasing completions through [`target_mut`] outside
    /// of `run`.
    ///
    /// [`target_mut`]: ScriptHost::target_mut
    pub fn flush_replies(&mut self) -> Result<usize> {
        let batch = {
            let mut outbox = self.outbox.borrow_mut();
            let mut batch = Vec::new();
            loop {
                let seq = outbox.next_to_send;
                match outbox.ready.remove(&seq) {
                    Some(reply) => {
                        outbox.next_to_send += 1;
                        batch.push(reply);
                    }
                    None => break,
                }
            }
            batch
        };
        if batch.is_empty() {
            return Ok(0);
        }

        self.writer.send_all(&batch)?;
        debug!(written = batch.len(), pending = self.pending_replies(), "replies written");
        Ok(batch.len())
    }

    /// Serve requests until the channel side disconnects. Returns the number
    /// of requests received.
    ///
    /// Completed replies are written before each blocking read. The target
    /// only runs inside `serve`, so a completion it keeps past `run` is
    /// written once a later `run` releases it. A target that needs to finish
    /// work with no further requests arriving should be driven with
    /// [`serve_one`] and [`flush_replies`] instead.
    ///
    /// [`serve_one`]: ScriptHost::serve_one
    /// [`flush_replies`]: ScriptHost::flush_replies
    pub fn serve(&mut self) -> Result<u64> {
        loop {
            self.flush_replies()?;
            match self.serve_one() {
                Ok(true) => {}
                Ok(false) => break,
                Err(ChannelError::Frame(FrameError::ConnectionClosed)) => {
                    warn!(received = self.next_seq, "channel closed partway through a request");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let unanswered = self.pending_replies();
        if unanswered > 0 {
            warn!(unanswered, "channel disconnected with replies outstanding");
        }
        info!(received = self.next_seq, "channel disconnected");
        Ok(self.next_seq)
    }

    /// Requests received whose replies have not been written yet.
    pub fn pending_replies(&self) -> u64 {
        self.next_seq - self.outbox.borrow().next_to_send
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Consume the host and return its target.
    pub fn into_target(self) -> T {
        self.target
    }
}

impl<T: ExecutionTarget> ScriptHost<SocketStream, SocketStream, T> {
    /// Serve over a connected socket, reading and writing through clones of
    /// the same stream.
    pub fn over_socket(stream: SocketStream, target: T, config: FrameConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let reader = FrameReader::with_config_socket(reader_stream, config.clone())?;
        let writer = FrameWriter::with_config_socket(stream, config)?;
        Ok(Self::from_parts(reader, writer, target))
    }
}
