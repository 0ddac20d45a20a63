//! # Packet Framing Codec
//!
//! Tokio codec for the outer CM packet format:
//!
//! ```text
//! [Length(4, LE)] [Magic(4, LE) = 0x31305456] [Payload(Length)]
//! ```
//!
//! The payload is the encrypted-or-plain message bytes; encryption is
//! applied above this layer. A magic mismatch is a fatal protocol violation
//! and terminates the connection, as does a length beyond the configured
//! maximum.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE, PACKET_MAGIC};
use crate::error::ProtocolError;

/// Framing codec producing and consuming raw message payloads.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        let magic = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);

        if magic != PACKET_MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }
        if length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(length));
        }

        if src.len() < PACKET_HEADER_SIZE + length {
            // Wait for the rest of the payload.
            src.reserve(PACKET_HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(PACKET_HEADER_SIZE);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(payload.len()));
        }

        dst.reserve(PACKET_HEADER_SIZE + payload.len());
        dst.put_u32_le(payload.len() as u32);
        dst.put_u32_le(PACKET_MAGIC);
        dst.put_slice(&payload);
        Ok(())
    }
}
