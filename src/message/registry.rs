//! # Body Registry
//!
//! Maps message-type ids to body decoders. The protocol engine only decodes
//! bodies it has a registered schema for; anything else stays as raw bytes
//! on the envelope and is still dispatched to listeners. A registered
//! decoder that fails is a hard error, an unregistered id is not.

use std::collections::HashMap;

use prost::Message as _;

use crate::error::Result;
use crate::message::emsg;
use crate::message::structs::{
    ChannelEncryptRequest, ChannelEncryptResponse, ChannelEncryptResult, StructBody,
};
use crate::proto;

/// A decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    ChannelEncryptRequest(ChannelEncryptRequest),
    ChannelEncryptResponse(ChannelEncryptResponse),
    ChannelEncryptResult(ChannelEncryptResult),
    Multi(proto::CMsgMulti),
    LogonResponse(proto::CMsgClientLogonResponse),
    GcRelay(proto::CMsgGcClient),
}

type Decoder = fn(&[u8]) -> Result<Body>;

/// Lookup table from message-type id to body decoder.
pub struct MessageRegistry {
    decoders: HashMap<u32, Decoder>,
}

impl MessageRegistry {
    /// Registry covering the bodies the protocol engine itself consumes.
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };
        registry.register(emsg::CHANNEL_ENCRYPT_REQUEST, |data| {
            Ok(Body::ChannelEncryptRequest(ChannelEncryptRequest::decode(
                data,
            )?))
        });
        registry.register(emsg::CHANNEL_ENCRYPT_RESPONSE, |data| {
            Ok(Body::ChannelEncryptResponse(ChannelEncryptResponse::decode(
                data,
            )?))
        });
        registry.register(emsg::CHANNEL_ENCRYPT_RESULT, |data| {
            Ok(Body::ChannelEncryptResult(ChannelEncryptResult::decode(
                data,
            )?))
        });
        registry.register(emsg::MULTI, |data| {
            Ok(Body::Multi(proto::CMsgMulti::decode(data)?))
        });
        registry.register(emsg::CLIENT_LOG_ON_RESPONSE, |data| {
            Ok(Body::LogonResponse(proto::CMsgClientLogonResponse::decode(
                data,
            )?))
        });
        registry.register(emsg::CLIENT_FROM_GC, |data| {
            Ok(Body::GcRelay(proto::CMsgGcClient::decode(data)?))
        });
        registry
    }

    pub fn register(&mut self, emsg: u32, decoder: Decoder) {
        self.decoders.insert(emsg, decoder);
    }

    /// Decode `data` if a decoder is registered for `emsg`. Returns
    /// `Ok(None)` for unregistered ids; decoder failures propagate.
    pub fn decode(&self, emsg: u32, data: &[u8]) -> Result<Option<Body>> {
        match self.decoders.get(&emsg) {
            Some(decoder) => decoder(data).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
