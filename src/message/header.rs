//! # Message Headers
//!
//! The four header variants of the CM protocol as a tagged enum with a
//! shared encode/size contract:
//!
//! - **Basic** (20 bytes): the three unencrypted channel-encryption messages
//! - **Extended** (36 bytes): legacy struct-bodied messages with session
//!   context
//! - **Proto** (8-byte prefix + embedded protobuf sub-header): everything
//!   after the handshake
//! - **GcProto**: same shape, nested inside game-coordinator payloads
//!
//! A proto header decoded from the wire keeps its original sub-header bytes
//! and re-emits them verbatim, so envelopes round-trip byte-exactly even
//! when the sub-header carries fields this client does not model. Mutation
//! (job/session stamping) invalidates the cached bytes.

use prost::Message as _;

use crate::core::serializer::{ByteOrder, Serializer};
use crate::error::{ProtocolError, Result};
use crate::message::emsg;
use crate::message::job::{job_id_from_proto, job_id_to_proto, Job, JOB_NONE};
use crate::proto;

pub const BASIC_HEADER_SIZE: usize = 20;
pub const EXTENDED_HEADER_SIZE: usize = 36;
/// Masked emsg (4) + sub-header length (4).
pub const PROTO_HEADER_PREFIX_SIZE: usize = 8;

/// 20-byte header used only by the unencrypted handshake messages.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicHeader {
    pub emsg: u32,
    pub target_job_id: i64,
    pub source_job_id: i64,
}

impl Default for BasicHeader {
    fn default() -> Self {
        Self {
            emsg: emsg::INVALID,
            target_job_id: JOB_NONE,
            source_job_id: JOB_NONE,
        }
    }
}

impl BasicHeader {
    pub fn new(emsg: u32) -> Self {
        Self {
            emsg,
            ..Self::default()
        }
    }

    fn serializer() -> Serializer<Self> {
        Serializer::builder(ByteOrder::Little)
            .u32_field(|h: &Self| h.emsg, |h, v| h.emsg = v)
            .i64_field(|h| h.target_job_id, |h, v| h.target_job_id = v)
            .i64_field(|h| h.source_job_id, |h, v| h.source_job_id = v)
            .build()
    }
}

/// 36-byte header carrying session context for legacy struct-bodied
/// messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedHeader {
    pub emsg: u32,
    pub header_size: u8,
    pub header_version: u16,
    pub target_job_id: i64,
    pub source_job_id: i64,
    pub canary: u8,
    pub steam_id: i64,
    pub session_id: i32,
}

impl Default for ExtendedHeader {
    fn default() -> Self {
        Self {
            emsg: emsg::INVALID,
            header_size: 0,
            header_version: 0,
            target_job_id: JOB_NONE,
            source_job_id: JOB_NONE,
            canary: 0,
            steam_id: -1,
            session_id: -1,
        }
    }
}

impl ExtendedHeader {
    pub fn new(emsg: u32) -> Self {
        Self {
            emsg,
            ..Self::default()
        }
    }

    fn serializer() -> Serializer<Self> {
        Serializer::builder(ByteOrder::Little)
            .u32_field(|h: &Self| h.emsg, |h, v| h.emsg = v)
            .u8_field(|h| h.header_size, |h, v| h.header_size = v)
            .u16_field(|h| h.header_version, |h, v| h.header_version = v)
            .i64_field(|h| h.target_job_id, |h, v| h.target_job_id = v)
            .i64_field(|h| h.source_job_id, |h, v| h.source_job_id = v)
            .u8_field(|h| h.canary, |h, v| h.canary = v)
            .i64_field(|h| h.steam_id, |h, v| h.steam_id = v)
            .i32_field(|h| h.session_id, |h, v| h.session_id = v)
            .build()
    }
}

/// Variable-length header with an embedded protobuf sub-header.
#[derive(Debug, Clone)]
pub struct ProtoHeader {
    pub emsg: u32,
    pub proto: proto::CMsgProtoBufHeader,
    /// Original encoded sub-header, kept for byte-exact re-emission.
    raw: Option<Vec<u8>>,
}

impl ProtoHeader {
    pub fn new(emsg: u32, proto: proto::CMsgProtoBufHeader) -> Self {
        Self {
            emsg,
            proto,
            raw: None,
        }
    }

    /// Mutable sub-header access; drops the cached wire bytes.
    pub fn proto_mut(&mut self) -> &mut proto::CMsgProtoBufHeader {
        self.raw = None;
        &mut self.proto
    }

    fn sub_header_bytes(&self) -> Vec<u8> {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => self.proto.encode_to_vec(),
        }
    }
}

impl PartialEq for ProtoHeader {
    fn eq(&self, other: &Self) -> bool {
        self.emsg == other.emsg && self.proto == other.proto
    }
}

/// Game-coordinator flavor of the proto header, nested one envelope deeper.
#[derive(Debug, Clone)]
pub struct GcProtoHeader {
    pub emsg: u32,
    pub proto: proto::gc::CMsgProtoBufHeader,
    raw: Option<Vec<u8>>,
}

impl GcProtoHeader {
    pub fn new(emsg: u32, proto: proto::gc::CMsgProtoBufHeader) -> Self {
        Self {
            emsg,
            proto,
            raw: None,
        }
    }

    pub fn proto_mut(&mut self) -> &mut proto::gc::CMsgProtoBufHeader {
        self.raw = None;
        &mut self.proto
    }

    fn sub_header_bytes(&self) -> Vec<u8> {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => self.proto.encode_to_vec(),
        }
    }
}

impl PartialEq for GcProtoHeader {
    fn eq(&self, other: &Self) -> bool {
        self.emsg == other.emsg && self.proto == other.proto
    }
}

/// A message header, polymorphic over the protocol's variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Basic(BasicHeader),
    Extended(ExtendedHeader),
    Proto(ProtoHeader),
    GcProto(GcProtoHeader),
}

impl Header {
    /// Unmasked message-type id.
    pub fn emsg(&self) -> u32 {
        match self {
            Header::Basic(h) => h.emsg,
            Header::Extended(h) => h.emsg,
            Header::Proto(h) => h.emsg,
            Header::GcProto(h) => h.emsg,
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Header::Basic(_) => BASIC_HEADER_SIZE,
            Header::Extended(_) => EXTENDED_HEADER_SIZE,
            Header::Proto(h) => PROTO_HEADER_PREFIX_SIZE + h.sub_header_bytes().len(),
            Header::GcProto(h) => PROTO_HEADER_PREFIX_SIZE + h.sub_header_bytes().len(),
        }
    }

    /// Serialize, re-setting the protobuf flag on proto variants.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Header::Basic(h) => BasicHeader::serializer().pack(h),
            Header::Extended(h) => ExtendedHeader::serializer().pack(h),
            Header::Proto(h) => encode_proto_prefix(h.emsg, h.sub_header_bytes()),
            Header::GcProto(h) => encode_proto_prefix(h.emsg, h.sub_header_bytes()),
        }
    }

    /// Decode a top-level CM header: the protobuf flag picks Proto, plain
    /// ids decode as Basic (only the handshake messages arrive non-proto).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let raw = read_raw_emsg(data)?;
        if emsg::is_proto(raw) {
            let (emsg, sub) = decode_proto_prefix(data)?;
            let proto = proto::CMsgProtoBufHeader::decode(sub)?;
            Ok(Header::Proto(ProtoHeader {
                emsg,
                proto,
                raw: Some(sub.to_vec()),
            }))
        } else {
            let mut header = BasicHeader::default();
            BasicHeader::serializer().unpack(&mut header, data)?;
            Ok(Header::Basic(header))
        }
    }

    /// Decode an extended header where the caller knows the message uses
    /// the 36-byte layout.
    pub fn decode_extended(data: &[u8]) -> Result<Self> {
        let mut header = ExtendedHeader::default();
        ExtendedHeader::serializer().unpack(&mut header, data)?;
        Ok(Header::Extended(header))
    }

    /// Decode the header of a nested game-coordinator payload.
    pub fn decode_gc(data: &[u8]) -> Result<Self> {
        let (emsg, sub) = decode_proto_prefix(data)?;
        let proto = proto::gc::CMsgProtoBufHeader::decode(sub)?;
        Ok(Header::GcProto(GcProtoHeader {
            emsg,
            proto,
            raw: Some(sub.to_vec()),
        }))
    }

    /// True for variants that carry a protobuf body.
    pub fn is_proto(&self) -> bool {
        matches!(self, Header::Proto(_) | Header::GcProto(_))
    }

    pub fn source_job_id(&self) -> i64 {
        match self {
            Header::Basic(h) => h.source_job_id,
            Header::Extended(h) => h.source_job_id,
            Header::Proto(h) => job_id_from_proto(h.proto.jobid_source),
            Header::GcProto(h) => job_id_from_proto(h.proto.jobid_source),
        }
    }

    pub fn target_job_id(&self) -> i64 {
        match self {
            Header::Basic(h) => h.target_job_id,
            Header::Extended(h) => h.target_job_id,
            Header::Proto(h) => job_id_from_proto(h.proto.jobid_target),
            Header::GcProto(h) => job_id_from_proto(h.proto.jobid_target),
        }
    }

    /// Stamp job correlation info into the header.
    pub fn set_job(&mut self, job: &Job) {
        match self {
            Header::Basic(h) => {
                h.source_job_id = job.source_job_id;
                h.target_job_id = job.target_job_id;
            }
            Header::Extended(h) => {
                h.source_job_id = job.source_job_id;
                h.target_job_id = job.target_job_id;
            }
            Header::Proto(h) => {
                let p = h.proto_mut();
                p.jobid_source = job_id_to_proto(job.source_job_id);
                p.jobid_target = job_id_to_proto(job.target_job_id);
                p.target_job_name = job.job_name.clone();
                p.realm = job.realm.map(|r| r as u32);
            }
            Header::GcProto(h) => {
                let p = h.proto_mut();
                p.jobid_source = job_id_to_proto(job.source_job_id);
                p.jobid_target = job_id_to_proto(job.target_job_id);
                p.target_job_name = job.job_name.clone();
            }
        }
    }

    /// Stamp the session context into variants that carry it; absent parts
    /// are left as they are. Basic headers have no session fields and are
    /// untouched.
    pub fn set_session(&mut self, steam_id: Option<u64>, session_id: Option<i32>) {
        if steam_id.is_none() && session_id.is_none() {
            return;
        }
        match self {
            Header::Basic(_) => {}
            Header::Extended(h) => {
                if let Some(id) = steam_id {
                    h.steam_id = id as i64;
                }
                if let Some(id) = session_id {
                    h.session_id = id;
                }
            }
            Header::Proto(h) => {
                let p = h.proto_mut();
                if steam_id.is_some() {
                    p.steamid = steam_id;
                }
                if session_id.is_some() {
                    p.client_sessionid = session_id;
                }
            }
            Header::GcProto(h) => {
                let p = h.proto_mut();
                if steam_id.is_some() {
                    p.client_steam_id = steam_id;
                }
                if session_id.is_some() {
                    p.client_session_id = session_id;
                }
            }
        }
    }

    /// Session id carried by the header, if any.
    pub fn session_id(&self) -> Option<i32> {
        match self {
            Header::Basic(_) => None,
            Header::Extended(h) => (h.session_id != -1).then_some(h.session_id),
            Header::Proto(h) => h.proto.client_sessionid,
            Header::GcProto(h) => h.proto.client_session_id,
        }
    }

    /// Steam id carried by the header, if any.
    pub fn steam_id(&self) -> Option<u64> {
        match self {
            Header::Basic(_) => None,
            Header::Extended(h) => (h.steam_id != -1).then_some(h.steam_id as u64),
            Header::Proto(h) => h.proto.steamid,
            Header::GcProto(h) => h.proto.client_steam_id,
        }
    }
}

fn read_raw_emsg(data: &[u8]) -> Result<u32> {
    if data.len() < 4 {
        return Err(ProtocolError::MalformedMessage(
            "message shorter than the type field".into(),
        ));
    }
    Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
}

fn encode_proto_prefix(emsg: u32, sub_header: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(PROTO_HEADER_PREFIX_SIZE + sub_header.len());
    out.extend_from_slice(&emsg::set_proto_mask(emsg).to_le_bytes());
    out.extend_from_slice(&(sub_header.len() as u32).to_le_bytes());
    out.extend_from_slice(&sub_header);
    out
}

fn decode_proto_prefix(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < PROTO_HEADER_PREFIX_SIZE {
        return Err(ProtocolError::MalformedMessage(
            "proto header prefix truncated".into(),
        ));
    }
    let emsg = emsg::clear_proto_mask(read_raw_emsg(data)?);
    let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let end = PROTO_HEADER_PREFIX_SIZE + length;
    if data.len() < end {
        return Err(ProtocolError::MalformedMessage(format!(
            "proto sub-header truncated: need {} bytes, have {}",
            end,
            data.len()
        )));
    }
    Ok((emsg, &data[PROTO_HEADER_PREFIX_SIZE..end]))
}
