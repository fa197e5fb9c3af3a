//! Varint header framing for OpAMP frames carried over a persistent connection.
//!
//! Every message sent over the streaming transport starts with an unsigned LEB128
//! varint (7 payload bits per byte, the top bit flags a continuation). The only
//! defined value is [`PROTOCOL_INDICATOR`]; anything else means the frame is not
//! an OpAMP protobuf payload and must be rejected.

use bytes::Buf;
use prost::Message;
use thiserror::Error;

/// The header value announcing a protobuf-encoded OpAMP message.
pub const PROTOCOL_INDICATOR: u64 = 0;

/// Upper bound of a header encoding, enough for any `u64`.
pub const MAX_HEADER_LEN: usize = 10;

const CONTINUATION_BIT: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7f;
const MAX_SHIFT: u32 = 70;

/// Errors raised while encoding or decoding a frame header.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FramingError {
    /// The caller supplied buffer cannot hold the encoding.
    #[error("buffer too small: `{needed}` bytes needed, `{available}` available")]
    BufferTooSmall {
        /// Bytes the encoding requires.
        needed: usize,
        /// Bytes the buffer provides.
        available: usize,
    },
    /// The varint does not fit in 64 bits.
    #[error("varint overflows 64 bits")]
    Overflow,
    /// The input ended before a terminating byte.
    #[error("input ended before the varint terminated")]
    Incomplete,
    /// The header decoded to a value other than the protocol indicator.
    #[error("unexpected header value `{0}`")]
    InvalidIndicator(u64),
}

/// Number of bytes the minimal encoding of `value` takes.
pub fn encoded_len(value: u64) -> usize {
    let significant_bits = (u64::BITS - (value | 1).leading_zeros()) as usize;
    significant_bits.div_ceil(7)
}

/// Writes `value` as a varint at the start of `buffer`, returning the bytes written.
pub fn write_header(buffer: &mut [u8], value: u64) -> Result<usize, FramingError> {
    let needed = encoded_len(value);
    if buffer.len() < needed {
        return Err(FramingError::BufferTooSmall {
            needed,
            available: buffer.len(),
        });
    }

    let mut remaining = value;
    for (written, slot) in buffer.iter_mut().enumerate() {
        let byte = (remaining as u8) & PAYLOAD_MASK;
        remaining >>= 7;
        if remaining == 0 {
            *slot = byte;
            return Ok(written + 1);
        }
        *slot = byte | CONTINUATION_BIT;
    }
    // the length check above guarantees the loop terminates first
    Err(FramingError::BufferTooSmall {
        needed,
        available: buffer.len(),
    })
}

/// Reads one varint from `buf`, advancing it past the consumed bytes.
pub fn decode_varint64<B: Buf>(buf: &mut B) -> Result<u64, FramingError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    while buf.has_remaining() {
        let byte = buf.get_u8();
        let payload = u64::from(byte & PAYLOAD_MASK);
        // the tenth byte only has room for the highest bit
        if shift == 63 && payload > 1 {
            return Err(FramingError::Overflow);
        }
        value |= payload << shift;
        if byte & CONTINUATION_BIT == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= MAX_SHIFT {
            return Err(FramingError::Overflow);
        }
    }
    Err(FramingError::Incomplete)
}

/// Decodes the leading header of `buffer` and checks it carries the protocol indicator.
/// Returns the header length. `buffer` is taken by value so callers keep their own cursor.
pub fn verify_header<B: Buf>(mut buffer: B) -> Result<usize, FramingError> {
    let available = buffer.remaining();
    match decode_varint64(&mut buffer)? {
        PROTOCOL_INDICATOR => Ok(available - buffer.remaining()),
        other => Err(FramingError::InvalidIndicator(other)),
    }
}

/// Non-failing variant of [`verify_header`] for the untrusted receive path.
pub fn try_verify_header<B: Buf>(buffer: B) -> Option<usize> {
    verify_header(buffer).ok()
}

/// Serializes `msg` prefixed by the protocol indicator header.
pub fn encode_frame<M: Message>(msg: &M) -> Result<Vec<u8>, FramingError> {
    let mut header = [0u8; MAX_HEADER_LEN];
    let header_len = write_header(&mut header, PROTOCOL_INDICATOR)?;

    let mut frame = Vec::with_capacity(header_len + msg.encoded_len());
    frame.extend_from_slice(&header[..header_len]);
    frame.extend_from_slice(&msg.encode_to_vec());
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::chunks::ChunkChain;
    use crate::opamp::proto::AgentToServer;
    use assert_matches::assert_matches;

    fn encode(value: u64) -> Vec<u8> {
        let mut buffer = [0u8; MAX_HEADER_LEN];
        let written = write_header(&mut buffer, value).unwrap();
        buffer[..written].to_vec()
    }

    #[test]
    fn round_trip_uses_minimal_length() {
        let boundaries = (0..64u32).flat_map(|bit| {
            let v = 1u64 << bit;
            [v - 1, v, v + 1]
        });
        let random = (0..1000).map(|_| rand::random::<u64>());

        for value in boundaries.chain(random).chain([u64::MAX]) {
            let encoded = encode(value);
            assert_eq!(encoded.len(), encoded_len(value), "length for {value}");
            assert_eq!(decode_varint64(&mut encoded.as_slice()), Ok(value));
        }
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u64::MAX).len(), MAX_HEADER_LEN);
    }

    #[test]
    fn write_header_rejects_small_buffers() {
        let mut buffer = [0u8; 1];
        assert_eq!(write_header(&mut buffer, 0), Ok(1));
        assert_eq!(
            write_header(&mut buffer, 128),
            Err(FramingError::BufferTooSmall {
                needed: 2,
                available: 1
            })
        );
        assert_matches!(
            write_header(&mut [0u8; 0], 0),
            Err(FramingError::BufferTooSmall { .. })
        );
    }

    #[test]
    fn decode_fails_on_truncated_input() {
        assert_eq!(
            decode_varint64(&mut [0x80u8, 0x80].as_slice()),
            Err(FramingError::Incomplete)
        );
        assert_eq!(
            decode_varint64(&mut [0u8; 0].as_slice()),
            Err(FramingError::Incomplete)
        );
    }

    #[test]
    fn decode_fails_on_overflow() {
        // eleven continuation bytes
        let too_long = [0xffu8; 11];
        assert_eq!(
            decode_varint64(&mut too_long.as_slice()),
            Err(FramingError::Overflow)
        );

        // ten bytes whose last one carries more than the 64th bit
        let mut wide = [0xffu8; 10];
        wide[9] = 0x02;
        assert_eq!(
            decode_varint64(&mut wide.as_slice()),
            Err(FramingError::Overflow)
        );
    }

    #[test]
    fn verify_header_only_accepts_protocol_indicator() {
        assert_eq!(try_verify_header([0x00u8, 0x0a, 0x01].as_slice()), Some(1));
        // non-minimal zero is still the indicator
        assert_eq!(try_verify_header([0x80u8, 0x00].as_slice()), Some(2));

        assert_eq!(try_verify_header([0x01u8].as_slice()), None);
        assert_eq!(try_verify_header([0xacu8, 0x02].as_slice()), None);
        assert_eq!(try_verify_header([0x80u8].as_slice()), None);
        assert_eq!(try_verify_header([0u8; 0].as_slice()), None);
        assert_eq!(
            verify_header([0x05u8].as_slice()),
            Err(FramingError::InvalidIndicator(5))
        );
    }

    #[test]
    fn verify_header_reads_across_chunks() {
        let mut chain = ChunkChain::new();
        chain.push(vec![0x80u8]);
        chain.push(vec![0x80u8]);
        chain.push(vec![0x00u8, 0x42]);

        assert_eq!(try_verify_header(chain.clone()), Some(3));
        // the caller's cursor is untouched
        assert_eq!(bytes::Buf::remaining(&chain), 4);
    }

    #[test]
    fn encoded_frame_starts_with_indicator() {
        let msg = AgentToServer {
            instance_uid: vec![1, 2, 3],
            sequence_num: 7,
            ..Default::default()
        };
        let frame = encode_frame(&msg).unwrap();
        let header_len = try_verify_header(frame.as_slice()).unwrap();

        assert_eq!(header_len, 1);
        assert_eq!(
            AgentToServer::decode(&frame[header_len..]).unwrap(),
            msg
        );
    }
}
