use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: body length as a `u32` in native byte order.
pub const HEADER_SIZE: usize = 4;

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest body the 4-byte header can describe.
pub const MAX_ENCODABLE_PAYLOAD: usize = u32::MAX as usize;

/// Encode a body into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────────────┐
/// │ Length (4B, native)│ Body             │
/// │ u32                │ (Length bytes)   │
/// └────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = encode_header(body.len())?;
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&header);
    dst.put_slice(body);
    Ok(())
}

/// Header bytes announcing a body of `len` bytes.
pub(crate) fn encode_header(len: usize) -> Result<[u8; HEADER_SIZE]> {
    let len = u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: MAX_ENCODABLE_PAYLOAD,
    })?;
    Ok(len.to_ne_bytes())
}

/// Decode one frame body from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some(body_len) = parse_length(src) else {
        return Ok(None);
    };

    if body_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + body_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(body_len).freeze()))
}

/// Read the body length from a header. `None` if fewer than
/// [`HEADER_SIZE`] bytes are given.
pub(crate) fn parse_length(header: &[u8]) -> Option<usize> {
    let raw: [u8; HEADER_SIZE] = header.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(body_len(raw))
}

pub(crate) fn body_len(header: [u8; HEADER_SIZE]) -> usize {
    u32::from_ne_bytes(header) as usize
}

/// Configuration for framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking readers.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking writers.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_native_order_length() {
        let mut buf = BytesMut::new();
        encode_frame(b"abc", &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 3);
        assert_eq!(&buf[..HEADER_SIZE], &3u32.to_ne_bytes());
        assert_eq!(&buf[HEADER_SIZE..], b"abc");
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let body = b"__fbBatchedBridge.flushedQueue();";
        encode_frame(body, &mut buf).unwrap();

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.as_ref(), body);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x05, 0x00][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&(32u32 * 1024 * 1024).to_ne_bytes());

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"first");
        assert_eq!(f2.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_body_is_a_complete_frame() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn parse_length_needs_full_header() {
        assert_eq!(parse_length(&[1, 2, 3]), None);
        assert_eq!(parse_length(&7u32.to_ne_bytes()), Some(7));
    }
}
