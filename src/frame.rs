//! Packet codec: the application-level sub-framing of a ring-buffer frame.
//!
//! A frame's payload carries three native-endian machine words of routing
//! metadata followed by the raw chunk bytes:
//!
//! ```text
//! origin (usize) | destination (usize) | sequence (usize) | raw bytes
//! ```
//!
//! The wire format is bit-exact by contract (host word size and
//! endianness), so encode and decode are the only two places that know the
//! layout. Sequence numbers are assigned per producer and let consumers
//! verify per-source FIFO ordering.

use bytes::Bytes;
use thiserror::Error;

use crate::ring::WORD;

/// Bytes of routing metadata at the front of every packet.
pub const HEADER_LEN: usize = 3 * WORD;

/// Decode failures for [`Packet::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The frame is shorter than the three-word header.
    #[error("frame of {len} bytes is shorter than the {HEADER_LEN}-byte packet header")]
    TooShort {
        /// Observed frame length.
        len: usize,
    },
}

/// One decoded packet: routing metadata plus the chunk payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Identifier of the producing source.
    pub origin: usize,
    /// Identifier of the sink destination.
    pub destination: usize,
    /// Per-source emission counter, non-decreasing within one origin.
    pub sequence: usize,
    /// Raw chunk bytes.
    pub payload: Bytes,
}

impl Packet {
    /// Serialize into the wire layout, appending to `buf`.
    ///
    /// Appending lets producers reuse one scratch buffer per chunk instead
    /// of allocating per packet.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.origin.to_ne_bytes());
        buf.extend_from_slice(&self.destination.to_ne_bytes());
        buf.extend_from_slice(&self.sequence.to_ne_bytes());
        buf.extend_from_slice(&self.payload);
    }

    /// Parse a frame back into a packet, copying the payload out of the
    /// caller's scratch buffer.
    pub fn decode(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < HEADER_LEN {
            return Err(PacketError::TooShort { len: frame.len() });
        }

        let word = |i: usize| {
            let mut w = [0u8; WORD];
            w.copy_from_slice(&frame[i * WORD..(i + 1) * WORD]);
            usize::from_ne_bytes(w)
        };

        Ok(Self {
            origin: word(0),
            destination: word(1),
            sequence: word(2),
            payload: Bytes::copy_from_slice(&frame[HEADER_LEN..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let packet = Packet {
            origin: 3,
            destination: 17,
            sequence: 42_000,
            payload: Bytes::from_static(b"chunk of stream data"),
        };

        let mut wire = Vec::new();
        packet.encode_into(&mut wire);
        assert_eq!(wire.len(), HEADER_LEN + 20);

        assert_eq!(Packet::decode(&wire).unwrap(), packet);
    }

    #[test]
    fn empty_payload_is_valid() {
        let packet = Packet {
            origin: 0,
            destination: 255,
            sequence: 0,
            payload: Bytes::new(),
        };
        let mut wire = Vec::new();
        packet.encode_into(&mut wire);
        assert_eq!(wire.len(), HEADER_LEN);
        assert_eq!(Packet::decode(&wire).unwrap(), packet);
    }

    #[test]
    fn short_frame_is_rejected() {
        let err = Packet::decode(&[0u8; HEADER_LEN - 1]).unwrap_err();
        assert_eq!(
            err,
            PacketError::TooShort {
                len: HEADER_LEN - 1
            }
        );
    }

    #[test]
    fn header_words_are_native_endian() {
        let packet = Packet {
            origin: 0x0102,
            destination: 1,
            sequence: 2,
            payload: Bytes::new(),
        };
        let mut wire = Vec::new();
        packet.encode_into(&mut wire);
        assert_eq!(&wire[..WORD], &0x0102usize.to_ne_bytes());
    }
}
