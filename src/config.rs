//! # Protocol Constants & Client Configuration
//!
//! Wire-level constants of the Steam CM protocol and the tunable knobs of
//! the client (timeouts, dispatch concurrency).

use std::time::Duration;

/// Outer packet magic, b"VT01" read as a little-endian u32.
pub const PACKET_MAGIC: u32 = 0x31305456;

/// Size of the outer packet header: u32 payload length + u32 magic.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Maximum accepted payload length (prevents memory exhaustion on a bad
/// or hostile length field).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Protocol version advertised in the client logon message.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 65580;

/// Package version advertised in the client logon message.
pub const DEFAULT_CLIENT_PACKAGE_VERSION: u32 = 1561159470;

/// XOR mask applied to the local IPv4 address in the logon message.
pub const ADDRESS_MASK: u32 = 0xF00DBAAD;

/// Tunable client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for the channel-encryption handshake to complete.
    pub handshake_timeout: Duration,
    /// Upper bound for a logon response to arrive.
    pub logon_timeout: Duration,
    /// Default timeout for `wait_for_*` calls that do not specify one.
    pub wait_timeout: Duration,
    /// Maximum number of listener callbacks executing concurrently.
    pub dispatch_workers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            logon_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(30),
            dispatch_workers: 10,
        }
    }
}
