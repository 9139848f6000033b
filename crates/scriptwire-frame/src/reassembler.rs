//! Incremental frame reassembly over a non-blocking connection.
//!
//! Each frame cycle has two phases:
//! - header: wait until 4 bytes are available, read them, record the body
//!   length as the target
//! - body: read up to the missing number of bytes until the target is met
//!
//! Bytes beyond the current frame are never read, so they stay buffered in
//! the connection for the next cycle.

use bytes::{Bytes, BytesMut};
use scriptwire_transport::Connection;
use tracing::trace;

use crate::codec::{parse_length, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Rebuilds complete frame bodies from whatever the connection has buffered.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    target: Option<usize>,
    max_payload: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    /// Create a reassembler accepting bodies up to [`DEFAULT_MAX_PAYLOAD`].
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a reassembler with an explicit body size limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            target: None,
            max_payload,
        }
    }

    /// Try to complete one frame.
    ///
    /// Returns `Ok(None)` when the connection does not hold enough bytes yet;
    /// call again on the next data notification. A declared length above the
    /// limit is an error, after which framing on this connection is lost.
    pub fn poll_frame<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<Option<Bytes>> {
        if !self.read_header(conn)? {
            return Ok(None);
        }
        if !self.read_body(conn)? {
            return Ok(None);
        }

        let body = self.buf.split().freeze();
        self.target = None;
        trace!(len = body.len(), "frame reassembled");
        Ok(Some(body))
    }

    /// Pull every frame that can be completed right now, in order.
    ///
    /// Returns the number of frames handed to `on_frame`.
    pub fn drain<C, F>(&mut self, conn: &mut C, mut on_frame: F) -> Result<usize>
    where
        C: Connection + ?Sized,
        F: FnMut(Bytes),
    {
        let mut completed = 0usize;
        while let Some(body) = self.poll_frame(conn)? {
            completed += 1;
            on_frame(body);
        }
        Ok(completed)
    }

    /// Forget any partially assembled frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.target = None;
    }

    /// Body length of the frame in progress, if its header has been read.
    pub fn expected_len(&self) -> Option<usize> {
        self.target
    }

    /// Body bytes collected so far for the frame in progress.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn read_header<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<bool> {
        if self.target.is_some() {
            return Ok(true);
        }
        if conn.bytes_available() < HEADER_SIZE {
            return Ok(false);
        }

        let header = conn.read(HEADER_SIZE)?;
        let len = parse_length(&header).ok_or_else(|| {
            FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection returned a short frame header",
            ))
        })?;
        if len > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        self.buf.reserve(len);
        self.target = Some(len);
        Ok(true)
    }

    fn read_body<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<bool> {
        let target = self.target.unwrap_or(0);
        let missing = target.saturating_sub(self.buf.len());
        if missing > 0 {
            let chunk = conn.read(missing)?;
            self.buf.extend_from_slice(&chunk);
        }
        Ok(self.buf.len() >= target)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};
    use proptest::prelude::*;
    use scriptwire_transport::{memory_pair, MemoryConnection, MemoryRemote};

    use super::*;
    use crate::codec::encode_frame;

    fn open_pair() -> (MemoryConnection, MemoryRemote) {
        let (mut conn, remote) = memory_pair();
        conn.open().unwrap();
        remote.accept();
        (conn, remote)
    }

    fn wire(bodies: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for body in bodies {
            encode_frame(body, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn collect(reassembler: &mut Reassembler, conn: &mut MemoryConnection) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        reassembler
            .drain(conn, |body| frames.push(body.to_vec()))
            .unwrap();
        frames
    }

    #[test]
    fn survives_any_chunking() {
        let body: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let bytes = wire(&[&body]);

        for chunk_size in [1usize, 2, 3, 4, 5, 7, 64, 999, 1004] {
            let (mut conn, remote) = open_pair();
            let mut reassembler = Reassembler::new();
            let mut frames = Vec::new();

            for chunk in bytes.chunks(chunk_size) {
                remote.send(chunk);
                frames.extend(collect(&mut reassembler, &mut conn));
            }

            assert_eq!(frames, vec![body.clone()], "chunk size {chunk_size}");
            assert_eq!(reassembler.expected_len(), None);
        }
    }

    proptest! {
        #[test]
        fn random_bodies_survive_random_splits(
            bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..600), 1..6),
            chunk_size in 1usize..64,
        ) {
            let refs: Vec<&[u8]> = bodies.iter().map(Vec::as_slice).collect();
            let bytes = wire(&refs);
            let (mut conn, remote) = open_pair();
            let mut reassembler = Reassembler::new();
            let mut frames = Vec::new();

            for chunk in bytes.chunks(chunk_size) {
                remote.send(chunk);
                frames.extend(collect(&mut reassembler, &mut conn));
            }

            prop_assert_eq!(frames, bodies);
            prop_assert_eq!(reassembler.expected_len(), None);
            prop_assert_eq!(reassembler.buffered_len(), 0);
        }
    }

    #[test]
    fn extracts_several_frames_from_one_chunk() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::new();

        remote.send(&wire(&[b"a", b"bb", b"ccc"]));
        let frames = collect(&mut reassembler, &mut conn);

        assert_eq!(frames, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
        assert_eq!(conn.bytes_available(), 0);
    }

    #[test]
    fn partial_header_stalls_without_consuming() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::new();
        let bytes = wire(&[b"late"]);

        remote.send(&bytes[..3]);
        assert!(reassembler.poll_frame(&mut conn).unwrap().is_none());
        assert_eq!(conn.bytes_available(), 3);
        assert_eq!(reassembler.expected_len(), None);

        remote.send(&bytes[3..]);
        let frames = collect(&mut reassembler, &mut conn);
        assert_eq!(frames, vec![b"late".to_vec()]);
    }

    #[test]
    fn partial_body_is_kept_between_notifications() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::new();
        let bytes = wire(&[b"0123456789"]);

        remote.send(&bytes[..HEADER_SIZE + 4]);
        assert!(reassembler.poll_frame(&mut conn).unwrap().is_none());
        assert_eq!(reassembler.expected_len(), Some(10));
        assert_eq!(reassembler.buffered_len(), 4);

        remote.send(&bytes[HEADER_SIZE + 4..]);
        assert_eq!(
            reassembler.poll_frame(&mut conn).unwrap().unwrap().as_ref(),
            b"0123456789"
        );
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn leaves_following_frame_bytes_in_connection() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::new();
        let mut bytes = wire(&[b"first"]);
        bytes.extend_from_slice(&wire(&[b"second"])[..2]);

        remote.send(&bytes);
        let frames = collect(&mut reassembler, &mut conn);
        assert_eq!(frames, vec![b"first".to_vec()]);
        assert_eq!(conn.bytes_available(), 2);
    }

    #[test]
    fn zero_length_frames_complete_immediately() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::new();

        remote.send(&wire(&[b"", b"x", b""]));
        let frames = collect(&mut reassembler, &mut conn);
        assert_eq!(frames, vec![Vec::new(), b"x".to_vec(), Vec::new()]);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::with_max_payload(8);

        let mut bytes = BytesMut::new();
        bytes.put_slice(&64u32.to_ne_bytes());
        remote.send(&bytes);

        let err = reassembler.poll_frame(&mut conn).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 64, max: 8 }));
    }

    #[test]
    fn reset_discards_partial_frame() {
        let (mut conn, remote) = open_pair();
        let mut reassembler = Reassembler::new();
        let bytes = wire(&[b"abandoned"]);

        remote.send(&bytes[..HEADER_SIZE + 3]);
        assert!(reassembler.poll_frame(&mut conn).unwrap().is_none());
        reassembler.reset();
        assert_eq!(reassembler.expected_len(), None);
        assert_eq!(reassembler.buffered_len(), 0);

        remote.send(&wire(&[b"fresh"]));
        let frames = collect(&mut reassembler, &mut conn);
        assert_eq!(frames, vec![b"fresh".to_vec()]);
    }
}
