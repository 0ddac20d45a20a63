//! EMsg constants and the protobuf flag bit.
//!
//! A message-type id is a 31-bit integer; the top bit of the on-wire 32-bit
//! field signals a protobuf-encoded body and is cleared before dispatch.

/// Top bit of the on-wire message-type field.
pub const PROTO_MASK: u32 = 0x8000_0000;

pub const INVALID: u32 = 0;
pub const MULTI: u32 = 1;
pub const SERVICE_METHOD_RESPONSE: u32 = 147;
pub const SERVICE_METHOD_CALL_FROM_CLIENT: u32 = 151;
pub const CLIENT_HEART_BEAT: u32 = 703;
pub const CLIENT_LOG_OFF: u32 = 706;
pub const CLIENT_LOG_ON_RESPONSE: u32 = 751;
pub const CLIENT_CHANGE_STATUS: u32 = 716;
pub const CLIENT_PERSONA_STATE: u32 = 766;
pub const CHANNEL_ENCRYPT_REQUEST: u32 = 1303;
pub const CHANNEL_ENCRYPT_RESPONSE: u32 = 1304;
pub const CHANNEL_ENCRYPT_RESULT: u32 = 1305;
pub const CLIENT_TO_GC: u32 = 5452;
pub const CLIENT_FROM_GC: u32 = 5453;
pub const CLIENT_LOGON: u32 = 5514;

/// True when the on-wire message-type field flags a protobuf body.
pub fn is_proto(raw: u32) -> bool {
    raw & PROTO_MASK != 0
}

/// Clear the protobuf flag, yielding the 31-bit message-type id.
pub fn clear_proto_mask(raw: u32) -> u32 {
    raw & !PROTO_MASK
}

/// Set the protobuf flag for sending.
pub fn set_proto_mask(emsg: u32) -> u32 {
    emsg | PROTO_MASK
}

/// Human-readable name for logging; "Unknown" for unrecognized ids.
pub fn name(emsg: u32) -> &'static str {
    match emsg {
        MULTI => "Multi",
        SERVICE_METHOD_RESPONSE => "ServiceMethodResponse",
        SERVICE_METHOD_CALL_FROM_CLIENT => "ServiceMethodCallFromClient",
        CLIENT_HEART_BEAT => "ClientHeartBeat",
        CLIENT_LOG_OFF => "ClientLogOff",
        CLIENT_LOG_ON_RESPONSE => "ClientLogOnResponse",
        CLIENT_CHANGE_STATUS => "ClientChangeStatus",
        CLIENT_PERSONA_STATE => "ClientPersonaState",
        CHANNEL_ENCRYPT_REQUEST => "ChannelEncryptRequest",
        CHANNEL_ENCRYPT_RESPONSE => "ChannelEncryptResponse",
        CHANNEL_ENCRYPT_RESULT => "ChannelEncryptResult",
        CLIENT_TO_GC => "ClientToGC",
        CLIENT_FROM_GC => "ClientFromGC",
        CLIENT_LOGON => "ClientLogon",
        _ => "Unknown",
    }
}
