use bytes::Bytes;

use crate::{FrameError, LENGTH_PREFIX_SIZE, MAX_PAYLOAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Length,
    Payload,
    Done,
}

/// Incremental encoder for length-prefixed frames.
///
/// [`begin`](Self::begin) stages a payload; the caller then writes whatever
/// [`pending`](Self::pending) exposes and reports progress with
/// [`consume`](Self::consume), which is how the encoder survives partial
/// writes.  [`is_done`](Self::is_done) flips once the whole frame has been
/// consumed.
#[derive(Debug)]
pub struct FrameEncoder {
    phase: Phase,
    header: [u8; LENGTH_PREFIX_SIZE],
    /// Offset already consumed within the current phase's buffer.
    offset: usize,
    data: Bytes,
}

impl FrameEncoder {
    /// A fresh encoder with no frame staged.
    pub fn new() -> Self {
        Self {
            phase: Phase::Done,
            header: [0; LENGTH_PREFIX_SIZE],
            offset: 0,
            data: Bytes::new(),
        }
    }

    /// Stage a payload for transmission, replacing any previous frame.
    ///
    /// Applies the same size-limit check as the decoder so an oversize
    /// frame can never be produced on the wire.
    pub fn begin(&mut self, payload: Bytes) -> Result<(), FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
            });
        }
        self.header = (payload.len() as u32).to_be_bytes();
        self.data = payload;
        self.offset = 0;
        self.phase = Phase::Length;
        Ok(())
    }

    /// Drop the staged frame, if any.
    pub fn reset(&mut self) {
        self.phase = Phase::Done;
        self.offset = 0;
        self.data = Bytes::new();
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// The bytes still awaiting transmission in the current phase.
    ///
    /// Empty exactly when the frame is done.
    pub fn pending(&self) -> &[u8] {
        match self.phase {
            Phase::Length => &self.header[self.offset..],
            Phase::Payload => &self.data[self.offset..],
            Phase::Done => &[],
        }
    }

    /// Record that `n` bytes of [`pending`](Self::pending) reached the wire.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the pending byte count; the caller reports
    /// write progress, and writing bytes that were never pending is a bug.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.pending().len(),
            "consumed {n} bytes but only {} were pending",
            self.pending().len()
        );
        self.offset += n;
        match self.phase {
            Phase::Length if self.offset == LENGTH_PREFIX_SIZE => {
                self.phase = Phase::Payload;
                self.offset = 0;
                if self.data.is_empty() {
                    self.phase = Phase::Done;
                }
            }
            Phase::Payload if self.offset == self.data.len() => {
                self.phase = Phase::Done;
                self.offset = 0;
                self.data = Bytes::new();
            }
            _ => {}
        }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drain the encoder `step` bytes at a time and return the wire bytes.
    fn drain(enc: &mut FrameEncoder, step: usize) -> Vec<u8> {
        let mut wire = Vec::new();
        while !enc.is_done() {
            let chunk = enc.pending();
            let n = step.min(chunk.len());
            wire.extend_from_slice(&chunk[..n]);
            enc.consume(n);
        }
        wire
    }

    #[test]
    fn encodes_single_byte_frame() {
        let mut enc = FrameEncoder::new();
        enc.begin(Bytes::from_static(b"x")).unwrap();
        assert_eq!(drain(&mut enc, usize::MAX), [0, 0, 0, 1, b'x']);
    }

    #[test]
    fn encodes_three_byte_frame() {
        let mut enc = FrameEncoder::new();
        enc.begin(Bytes::from_static(b"xyz")).unwrap();
        assert_eq!(drain(&mut enc, usize::MAX), [0, 0, 0, 3, b'x', b'y', b'z']);
    }

    #[test]
    fn survives_one_byte_writes() {
        let mut enc = FrameEncoder::new();
        enc.begin(Bytes::from_static(b"partial")).unwrap();
        let wire = drain(&mut enc, 1);
        assert_eq!(&wire[..4], &[0, 0, 0, 7]);
        assert_eq!(&wire[4..], b"partial");
    }

    #[test]
    fn empty_payload_is_a_bare_prefix() {
        let mut enc = FrameEncoder::new();
        enc.begin(Bytes::new()).unwrap();
        assert_eq!(drain(&mut enc, usize::MAX), [0, 0, 0, 0]);
        assert!(enc.is_done());
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let mut enc = FrameEncoder::new();
        let err = enc
            .begin(Bytes::from(vec![0u8; MAX_PAYLOAD + 1]))
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(enc.is_done(), "rejected frame must not be staged");
    }

    #[test]
    fn fresh_encoder_has_nothing_pending() {
        let enc = FrameEncoder::new();
        assert!(enc.is_done());
        assert!(enc.pending().is_empty());
    }

    #[test]
    fn round_trips_through_the_decoder() {
        use crate::FrameDecoder;

        for payload in [&b""[..], b"x", b"abc", &[0u8; 300][..]] {
            let mut enc = FrameEncoder::new();
            enc.begin(Bytes::copy_from_slice(payload)).unwrap();
            let wire = drain(&mut enc, 3);

            let mut dec = FrameDecoder::new();
            let mut input = &wire[..];
            let decoded = dec.advance(&mut input).unwrap().unwrap();
            assert_eq!(&decoded[..], payload);
            assert!(input.is_empty());
        }
    }
}
