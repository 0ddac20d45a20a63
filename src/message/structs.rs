//! # Struct-Bodied Messages
//!
//! Non-protobuf message bodies built on the declarative serializer. Only the
//! three channel-encryption messages use these; everything after the
//! handshake is protobuf-bodied.

use crate::core::serializer::{ByteOrder, Serializer};
use crate::error::Result;

/// A fixed-layout message body with a declarative serializer.
pub trait StructBody: Default + Sized {
    fn serializer() -> Serializer<Self>;

    fn encode(&self) -> Vec<u8> {
        Self::serializer().pack(self)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let mut value = Self::default();
        Self::serializer().unpack(&mut value, data)?;
        Ok(value)
    }

    fn wire_size() -> usize {
        Self::serializer().size()
    }
}

/// Server's opening move of the channel-encryption handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEncryptRequest {
    pub protocol_version: u32,
    pub universe: u32,
    pub challenge: Vec<u8>,
}

impl Default for ChannelEncryptRequest {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            universe: 1,
            challenge: vec![0; 16],
        }
    }
}

impl StructBody for ChannelEncryptRequest {
    fn serializer() -> Serializer<Self> {
        Serializer::builder(ByteOrder::Little)
            .u32_field(|s: &Self| s.protocol_version, |s, v| s.protocol_version = v)
            .u32_field(|s| s.universe, |s, v| s.universe = v)
            .bytes_field(16, |s| s.challenge.clone(), |s, v| s.challenge = v)
            .build()
    }
}

/// Client's reply carrying the RSA-encrypted session key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEncryptResponse {
    pub protocol_version: u32,
    pub key_size: u32,
    pub key: Vec<u8>,
    pub crc32: u32,
    pub unknown: u32,
}

impl Default for ChannelEncryptResponse {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            key_size: 128,
            key: vec![0; 128],
            crc32: 0,
            unknown: 0,
        }
    }
}

impl StructBody for ChannelEncryptResponse {
    fn serializer() -> Serializer<Self> {
        Serializer::builder(ByteOrder::Little)
            .u32_field(|s: &Self| s.protocol_version, |s, v| s.protocol_version = v)
            .u32_field(|s| s.key_size, |s, v| s.key_size = v)
            .bytes_field(128, |s| s.key.clone(), |s, v| s.key = v)
            .u32_field(|s| s.crc32, |s, v| s.crc32 = v)
            .u32_field(|s| s.unknown, |s, v| s.unknown = v)
            .build()
    }
}

/// Server's verdict on the submitted session key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelEncryptResult {
    pub result: i32,
}

impl StructBody for ChannelEncryptResult {
    fn serializer() -> Serializer<Self> {
        Serializer::builder(ByteOrder::Little)
            .i32_field(|s: &Self| s.result, |s, v| s.result = v)
            .build()
    }
}
