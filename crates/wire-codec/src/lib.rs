//! # wire-codec
//!
//! Length-prefixed framing for the relay-gate wire protocol.  A frame is a
//! 4-byte big-endian payload length followed by that many raw bytes.  The
//! decoder and encoder are sans-I/O state machines: callers feed them byte
//! slices (or drain byte slices from them) in arbitrarily small pieces, so
//! partial reads and partial writes resume where they left off.
//!
//! ## Quick start
//!
//! ```rust
//! use wire_codec::{FrameDecoder, FrameEncoder};
//!
//! let mut enc = FrameEncoder::new();
//! enc.begin(bytes::Bytes::from_static(b"abc")).unwrap();
//! let mut wire = Vec::new();
//! while !enc.is_done() {
//!     let chunk = enc.pending();
//!     wire.extend_from_slice(chunk);
//!     let n = chunk.len();
//!     enc.consume(n);
//! }
//! assert_eq!(wire, [0, 0, 0, 3, b'a', b'b', b'c']);
//!
//! let mut dec = FrameDecoder::new();
//! let mut input = &wire[..];
//! let payload = dec.advance(&mut input).unwrap().unwrap();
//! assert_eq!(&payload[..], b"abc");
//! ```

mod checksum;
mod decoder;
mod encoder;

pub use checksum::integrity_tag;
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;

use thiserror::Error;

/// Maximum payload size carried by a single frame, in bytes.
pub const MAX_PAYLOAD: usize = 32 * 1024;

/// Size of the big-endian length prefix, in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors surfaced by the framing state machines.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The declared (or staged) payload length exceeds [`MAX_PAYLOAD`].
    ///
    /// On decode the four length bytes have already been consumed when this
    /// is returned; the caller decides whether to abort the connection.
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    PayloadTooLarge { len: usize },
}
