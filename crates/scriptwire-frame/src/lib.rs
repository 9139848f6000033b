//! Length-prefixed message framing for scriptwire.
//!
//! Every message on the wire is a 4-byte unsigned body length in native byte
//! order followed by exactly that many body bytes. There is no magic, no
//! checksum and no message identifier: the length is the only delimiter.
//!
//! - [`encode_frame`] / [`decode_frame`] work on whole buffers
//! - [`Reassembler`] pulls frames out of a non-blocking [`Connection`]
//!   chunk by chunk
//! - [`FrameReader`] / [`FrameWriter`] are the blocking counterparts used on
//!   the script host side
//!
//! [`Connection`]: scriptwire_transport::Connection

pub mod codec;
pub mod error;
pub mod reader;
pub mod reassembler;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::Reassembler;
pub use writer::FrameWriter;
