//! # steam-wire
//!
//! Async client implementation of the Steam connection-manager (CM) binary
//! protocol: packet framing, message envelopes over four header variants,
//! the channel-encryption handshake, priority-ordered listener dispatch
//! with job correlation, multi-message splitting, and a client layer for
//! login, heartbeats, and game-coordinator relays.
//!
//! ## Architecture
//! ```text
//! SteamClient / GameCoordinator   login, session, jobs, GC relay
//!         │
//!      CmClient                   encryption handshake
//!         │
//!     Connection                  read loop, encryption, dispatch
//!         │
//!   FrameCodec (tokio codec)      length + magic framing
//! ```
//!
//! ## Quick start
//! ```no_run
//! use steam_wire::client::SteamClient;
//! use steam_wire::config::ClientConfig;
//! use steam_wire::types::CmServer;
//!
//! # async fn run() -> steam_wire::Result<()> {
//! let servers = vec![CmServer::new("cm.example.net", 27017)];
//! let client = SteamClient::new(ClientConfig::default(), servers);
//! client.login_anonymous().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod message;
pub mod proto;
pub mod steamid;
pub mod types;

pub use client::{CmClient, GameCoordinator, LogonParameters, SteamClient};
pub use connection::Connection;
pub use error::{ProtocolError, Result};
pub use message::Message;
pub use steamid::SteamId;
