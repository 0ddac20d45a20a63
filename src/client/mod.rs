//! # Client Layers
//!
//! Three layers, each wrapping the previous:
//!
//! - [`cm::CmClient`]: connection plus the channel-encryption handshake
//! - [`steam::SteamClient`]: login, session context, heartbeat, job RPC
//! - [`gc::GameCoordinator`]: per-app relay to a game-coordinator backend

pub mod cm;
pub mod gc;
pub mod steam;

pub use cm::CmClient;
pub use gc::GameCoordinator;
pub use steam::{LogonParameters, SessionContext, SteamClient};
