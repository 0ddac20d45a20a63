//! # CM Client
//!
//! Connection to a CM server with the channel-encryption handshake driven
//! automatically. The handshake listeners are registered at construction:
//!
//! 1. Server sends `ChannelEncryptRequest` with a 16-byte challenge.
//! 2. Client generates a session key, RSA-encrypts `key ++ challenge` under
//!    the universe public key, and replies with `ChannelEncryptResponse`
//!    carrying the 128-byte blob and its CRC32.
//! 3. Server replies `ChannelEncryptResult`; on OK the key is installed on
//!    the connection and all further traffic is encrypted.
//!
//! `connect` blocks until the handshake settles or times out. Application
//! sends are rejected until the channel is encrypted; only the handshake
//! messages themselves may travel in plaintext.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::net::lookup_host;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::crypto::{self, SessionKey};
use crate::error::{ProtocolError, Result};
use crate::handler::{JobHandler, ListenerGroup, INTERNAL_LISTENER_PRIORITY};
use crate::message::structs::ChannelEncryptResponse;
use crate::message::{emsg, eresult, Message};
use crate::types::CmServer;

/// CM protocol client: a [`Connection`] plus the handshake state machine.
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct CmClient {
    connection: Connection,
    config: ClientConfig,
    pending_key: Arc<Mutex<Option<SessionKey>>>,
}

impl CmClient {
    pub fn new(config: ClientConfig) -> Self {
        let client = Self {
            connection: Connection::new(config.dispatch_workers),
            config,
            pending_key: Arc::new(Mutex::new(None)),
        };
        client.register_handshake_listeners();
        client
    }

    fn register_handshake_listeners(&self) {
        let connection = self.connection.clone();
        let pending = Arc::clone(&self.pending_key);
        self.connection.listeners().register(
            emsg::CHANNEL_ENCRYPT_REQUEST,
            INTERNAL_LISTENER_PRIORITY,
            move |message: Message| {
                on_channel_encrypt_request(&connection, &pending, &message)
            },
        );

        let connection = self.connection.clone();
        let pending = Arc::clone(&self.pending_key);
        self.connection.listeners().register(
            emsg::CHANNEL_ENCRYPT_RESULT,
            INTERNAL_LISTENER_PRIORITY,
            move |message: Message| on_channel_encrypt_result(&connection, &pending, &message),
        );
    }

    /// Connect to one of `servers` (shuffled for load distribution) and run
    /// the channel-encryption handshake to completion.
    #[instrument(skip(self, servers), fields(servers = servers.len()))]
    pub async fn connect(&self, servers: &[CmServer]) -> Result<()> {
        if self.connection.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }
        if servers.is_empty() {
            return Err(ProtocolError::HandshakeError("empty CM server list".into()));
        }

        let mut shuffled = servers.to_vec();
        shuffled.shuffle(&mut rand::thread_rng());

        // Register the wait first so the result cannot race past us.
        let handshake = self
            .connection
            .listeners()
            .begin_wait(emsg::CHANNEL_ENCRYPT_RESULT);

        let mut dialed = false;
        for server in &shuffled {
            match self.dial(server).await {
                Ok(()) => {
                    info!(%server, "connected to CM server");
                    dialed = true;
                    break;
                }
                Err(err) => warn!(%server, error = %err, "CM server unreachable"),
            }
        }
        if !dialed {
            self.connection.listeners().cancel_wait(handshake);
            return Err(ProtocolError::HandshakeError(
                "no CM server reachable".into(),
            ));
        }

        let result = match self
            .connection
            .listeners()
            .finish_wait(handshake, self.config.handshake_timeout)
            .await
        {
            Ok(result) => result,
            // A server that goes silent mid-handshake must not leave the
            // socket live, or every retry reports AlreadyConnected.
            Err(err) => {
                self.connection.disconnect().await;
                return Err(err);
            }
        };

        let verdict = result
            .channel_encrypt_result()
            .map(|r| r.result)
            .unwrap_or(eresult::INVALID);
        if verdict != eresult::OK || !self.connection.is_encrypted() {
            self.connection.disconnect().await;
            return Err(ProtocolError::HandshakeError(format!(
                "channel encryption refused with EResult {verdict}"
            )));
        }
        Ok(())
    }

    async fn dial(&self, server: &CmServer) -> Result<()> {
        let mut addrs = lookup_host((server.host.as_str(), server.port)).await?;
        let addr = addrs.next().ok_or_else(|| {
            ProtocolError::HandshakeError(format!("{server} did not resolve"))
        })?;
        self.connection.connect(addr).await
    }

    /// Send an application message. Rejected until the handshake has
    /// installed a session key; nothing but the handshake itself may travel
    /// unencrypted.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if !self.connection.is_encrypted() {
            return Err(ProtocolError::NotEncrypted);
        }
        self.connection.send(message).await
    }

    pub async fn wait_for(&self, emsg: u32, timeout: Duration) -> Result<Message> {
        self.connection.wait_for(emsg, timeout).await
    }

    pub fn listeners(&self) -> &ListenerGroup<u32, Message> {
        self.connection.listeners()
    }

    pub fn jobs(&self) -> &JobHandler<Message> {
        self.connection.jobs()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub async fn disconnect(&self) {
        self.pending_key
            .lock()
            .expect("pending key lock poisoned")
            .take();
        self.connection.disconnect().await;
    }
}

fn on_channel_encrypt_request(
    connection: &Connection,
    pending: &Arc<Mutex<Option<SessionKey>>>,
    message: &Message,
) -> Result<()> {
    let request = message.channel_encrypt_request().ok_or_else(|| {
        ProtocolError::MalformedMessage("ChannelEncryptRequest body missing".into())
    })?;
    debug!(
        protocol_version = request.protocol_version,
        universe = request.universe,
        "channel encrypt request received"
    );

    let key = SessionKey::generate();
    let encrypted_key = crypto::encrypt_session_key(&key, &request.challenge)?;
    let crc = crypto::crc32(&encrypted_key);

    *pending.lock().expect("pending key lock poisoned") = Some(key);

    let response = Message::structured(
        emsg::CHANNEL_ENCRYPT_RESPONSE,
        &ChannelEncryptResponse {
            protocol_version: 1,
            key_size: encrypted_key.len() as u32,
            key: encrypted_key,
            crc32: crc,
            unknown: 0,
        },
    );

    let connection = connection.clone();
    tokio::spawn(async move {
        if let Err(err) = connection.send(&response).await {
            error!(error = %err, "failed to send channel encrypt response");
        }
    });
    Ok(())
}

fn on_channel_encrypt_result(
    connection: &Connection,
    pending: &Arc<Mutex<Option<SessionKey>>>,
    message: &Message,
) -> Result<()> {
    let result = message.channel_encrypt_result().ok_or_else(|| {
        ProtocolError::MalformedMessage("ChannelEncryptResult body missing".into())
    })?;

    if result.result != eresult::OK {
        error!(eresult = result.result, "channel encryption refused");
        return Ok(());
    }

    match pending.lock().expect("pending key lock poisoned").take() {
        Some(key) => {
            connection.set_session_key(key);
            debug!("channel encryption established");
            Ok(())
        }
        None => Err(ProtocolError::HandshakeError(
            "encrypt result without a pending session key".into(),
        )),
    }
}
