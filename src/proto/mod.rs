//! # Wire Protobufs
//!
//! Manually defined prost messages for the protobuf bodies and sub-headers
//! the protocol engine needs. Only the fields this client reads or writes
//! are declared; unknown fields are skipped by prost on decode, so partial
//! schemas stay wire-compatible.

/// Embedded sub-header carried by every proto-headered CM message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgProtoBufHeader {
    #[prost(fixed64, optional, tag = "1")]
    pub steamid: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub client_sessionid: Option<i32>,
    #[prost(uint32, optional, tag = "3")]
    pub routing_appid: Option<u32>,
    #[prost(fixed64, optional, tag = "10")]
    pub jobid_source: Option<u64>,
    #[prost(fixed64, optional, tag = "11")]
    pub jobid_target: Option<u64>,
    #[prost(string, optional, tag = "12")]
    pub target_job_name: Option<String>,
    #[prost(int32, optional, tag = "13")]
    pub eresult: Option<i32>,
    #[prost(string, optional, tag = "14")]
    pub error_message: Option<String>,
    #[prost(uint32, optional, tag = "39")]
    pub realm: Option<u32>,
}

/// Container message carrying several concatenated sub-messages, optionally
/// gzip-compressed.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgMulti {
    /// Non-zero when `message_body` is gzip-compressed; holds the unpacked
    /// size.
    #[prost(uint32, optional, tag = "1")]
    pub size_unzipped: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message_body: Option<Vec<u8>>,
}

/// IP address, v4 or v6.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgIpAddress {
    #[prost(oneof = "ip_address::Ip", tags = "1, 2")]
    pub ip: Option<ip_address::Ip>,
}

pub mod ip_address {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Ip {
        #[prost(fixed32, tag = "1")]
        V4(u32),
        #[prost(bytes, tag = "2")]
        V6(Vec<u8>),
    }
}

/// Client logon request (subset).
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLogon {
    #[prost(uint32, optional, tag = "1")]
    pub protocol_version: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub cell_id: Option<u32>,
    #[prost(bool, optional, tag = "8")]
    pub should_remember_password: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "30")]
    pub machine_id: Option<Vec<u8>>,
    #[prost(string, optional, tag = "50")]
    pub account_name: Option<String>,
    #[prost(string, optional, tag = "51")]
    pub password: Option<String>,
    #[prost(uint32, optional, tag = "92")]
    pub client_package_version: Option<u32>,
    #[prost(string, optional, tag = "108")]
    pub access_token: Option<String>,
    #[prost(message, optional, tag = "113")]
    pub obfuscated_private_ip: Option<CMsgIpAddress>,
}

/// Client logon response (subset).
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLogonResponse {
    #[prost(int32, optional, tag = "1")]
    pub eresult: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub heartbeat_seconds: Option<i32>,
    #[prost(fixed64, optional, tag = "20")]
    pub client_supplied_steamid: Option<u64>,
}

/// Client heartbeat body.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientHeartBeat {
    #[prost(bool, optional, tag = "1")]
    pub send_reply: Option<bool>,
}

/// Game-coordinator relay envelope: a GC message (its own header plus body)
/// tunneled through the CM connection.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgGcClient {
    #[prost(uint32, optional, tag = "1")]
    pub appid: Option<u32>,
    /// Masked GC message type (top bit = protobuf flag).
    #[prost(uint32, optional, tag = "2")]
    pub msgtype: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub payload: Option<Vec<u8>>,
}

/// Game-coordinator flavor of the proto sub-header. Same shape as the CM
/// one but with its own field names on the session context.
pub mod gc {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CMsgProtoBufHeader {
        #[prost(fixed64, optional, tag = "1")]
        pub client_steam_id: Option<u64>,
        #[prost(int32, optional, tag = "2")]
        pub client_session_id: Option<i32>,
        #[prost(uint32, optional, tag = "3")]
        pub source_app_id: Option<u32>,
        #[prost(fixed64, optional, tag = "10")]
        pub jobid_source: Option<u64>,
        #[prost(fixed64, optional, tag = "11")]
        pub jobid_target: Option<u64>,
        #[prost(string, optional, tag = "12")]
        pub target_job_name: Option<String>,
    }
}
