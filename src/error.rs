//! # Error Types
//!
//! Error handling for the Steam CM protocol client.
//!
//! This module defines all error variants that can occur during protocol
//! operations, from low-level I/O errors to high-level protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Socket and stream failures
//! - **Protocol Errors**: Bad packet magic, malformed envelopes, handshake failures
//! - **Cryptographic Errors**: Session-key encryption, HMAC verification
//! - **Dispatch Errors**: Wait timeouts, disconnected waits
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid packet magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("HMAC verification failed")]
    HmacVerificationFailure,

    #[error("Channel encryption handshake failed: {0}")]
    HandshakeError(String),

    #[error("Logon failed with EResult {0}")]
    LogonFailure(i32),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Channel is not encrypted yet")]
    NotEncrypted,

    #[error("Listener error: {0}")]
    ListenerError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
