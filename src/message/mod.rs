//! # Message Envelope
//!
//! A decoded-or-encodable CM message: a [`Header`] plus a body. Bodies the
//! [`MessageRegistry`] knows are decoded eagerly on receive; everything else
//! rides along as raw bytes and can be decoded by the consumer with
//! [`Message::body_as`].

pub mod emsg;
pub mod eresult;
pub mod header;
pub mod job;
pub mod registry;
pub mod structs;

use bytes::Bytes;

use crate::error::Result;
use crate::message::header::{BasicHeader, Header, ProtoHeader};
use crate::message::registry::{Body, MessageRegistry};
use crate::message::structs::StructBody;
use crate::proto;

/// One CM message, inbound or outbound.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    /// Encoded body bytes, exactly as on the wire.
    pub body: Bytes,
    decoded: Option<Body>,
}

impl Message {
    /// Outbound proto-headered message.
    pub fn proto(emsg: u32, body: &impl prost::Message) -> Self {
        Self {
            header: Header::Proto(ProtoHeader::new(emsg, Default::default())),
            body: Bytes::from(body.encode_to_vec()),
            decoded: None,
        }
    }

    /// Outbound basic-headered message with a fixed-layout body. Only the
    /// channel-encryption handshake uses this form.
    pub fn structured(emsg: u32, body: &impl StructBody) -> Self {
        Self {
            header: Header::Basic(BasicHeader::new(emsg)),
            body: Bytes::from(body.encode()),
            decoded: None,
        }
    }

    /// Assemble an envelope from an already-decoded header and raw body,
    /// skipping registry lookup. Used for nested game-coordinator payloads.
    pub fn from_parts(header: Header, body: Bytes) -> Self {
        Self {
            header,
            body,
            decoded: None,
        }
    }

    /// Decode a full message from a decrypted packet payload.
    pub fn from_bytes(data: &[u8], registry: &MessageRegistry) -> Result<Self> {
        let header = Header::decode(data)?;
        let body = Bytes::copy_from_slice(&data[header.size()..]);
        let decoded = registry.decode(header.emsg(), &body)?;
        Ok(Self {
            header,
            body,
            decoded,
        })
    }

    /// Serialize header and body into one packet payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.header.encode();
        out.extend_from_slice(&self.body);
        out
    }

    pub fn emsg(&self) -> u32 {
        self.header.emsg()
    }

    /// Registry-decoded body, if any.
    pub fn body(&self) -> Option<&Body> {
        self.decoded.as_ref()
    }

    /// Decode the raw body as a protobuf message of the caller's choosing.
    pub fn body_as<M: prost::Message + Default>(&self) -> Result<M> {
        Ok(M::decode(self.body.as_ref())?)
    }

    pub fn multi(&self) -> Option<&proto::CMsgMulti> {
        match &self.decoded {
            Some(Body::Multi(m)) => Some(m),
            _ => None,
        }
    }

    pub fn logon_response(&self) -> Option<&proto::CMsgClientLogonResponse> {
        match &self.decoded {
            Some(Body::LogonResponse(r)) => Some(r),
            _ => None,
        }
    }

    pub fn gc_relay(&self) -> Option<&proto::CMsgGcClient> {
        match &self.decoded {
            Some(Body::GcRelay(g)) => Some(g),
            _ => None,
        }
    }

    pub fn channel_encrypt_request(&self) -> Option<&structs::ChannelEncryptRequest> {
        match &self.decoded {
            Some(Body::ChannelEncryptRequest(r)) => Some(r),
            _ => None,
        }
    }

    pub fn channel_encrypt_response(&self) -> Option<&structs::ChannelEncryptResponse> {
        match &self.decoded {
            Some(Body::ChannelEncryptResponse(r)) => Some(r),
            _ => None,
        }
    }

    pub fn channel_encrypt_result(&self) -> Option<&structs::ChannelEncryptResult> {
        match &self.decoded {
            Some(Body::ChannelEncryptResult(r)) => Some(r),
            _ => None,
        }
    }
}
