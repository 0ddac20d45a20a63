//! # Steam Client
//!
//! Session orchestration on top of the [`CmClient`]: login (anonymous or
//! with credentials), the session context captured from the logon response,
//! the periodic heartbeat, and job-correlated request/response RPC.
//!
//! Every outgoing proto-headered message is stamped with the current steam
//! id and session id before it is sent, so callers never manage session
//! fields themselves.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::client::cm::CmClient;
use crate::config::{
    ClientConfig, ADDRESS_MASK, DEFAULT_CLIENT_PACKAGE_VERSION, DEFAULT_PROTOCOL_VERSION,
};
use crate::error::{ProtocolError, Result};
use crate::handler::{JobHandler, ListenerGroup};
use crate::message::job::Job;
use crate::message::{emsg, eresult, Message};
use crate::proto;
use crate::steamid::{instance, AccountType, SteamId, Universe};
use crate::types::CmServer;

/// Connection-lifetime session state. Populated by the logon response,
/// cleared on disconnect.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    pub steam_id: Option<SteamId>,
    pub session_id: Option<i32>,
}

/// Credential set for a non-anonymous logon. Out-of-scope collaborators
/// (token persistence, auth-session services) produce these; the client
/// only consumes them.
#[derive(Debug, Default, Clone)]
pub struct LogonParameters {
    pub account_name: String,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub should_remember_password: bool,
    pub machine_id: Option<Vec<u8>>,
    pub cell_id: Option<u32>,
}

struct Shared {
    session: RwLock<SessionContext>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// High-level Steam client. Cheap to clone; clones share the connection and
/// session.
#[derive(Clone)]
pub struct SteamClient {
    cm: CmClient,
    servers: Arc<Vec<CmServer>>,
    shared: Arc<Shared>,
}

impl SteamClient {
    pub fn new(config: ClientConfig, servers: Vec<CmServer>) -> Self {
        Self {
            cm: CmClient::new(config),
            servers: Arc::new(servers),
            shared: Arc::new(Shared {
                session: RwLock::new(SessionContext::default()),
                heartbeat: Mutex::new(None),
            }),
        }
    }

    /// Log on anonymously. Connects (including the encryption handshake),
    /// sends the logon request, and blocks until the response arrives.
    #[instrument(skip(self))]
    pub async fn login_anonymous(&self) -> Result<()> {
        self.cm.connect(&self.servers).await?;

        let steam_id = SteamId::anonymous();
        info!(%steam_id, "logging in anonymously");

        let logon = proto::CMsgClientLogon {
            protocol_version: Some(DEFAULT_PROTOCOL_VERSION),
            client_package_version: Some(DEFAULT_CLIENT_PACKAGE_VERSION),
            ..Default::default()
        };
        self.complete_logon(steam_id, logon).await
    }

    /// Log on with credentials. The local IPv4 address is XOR-obfuscated
    /// into the logon body as the protocol expects.
    #[instrument(skip(self, params), fields(account = %params.account_name))]
    pub async fn login(&self, params: LogonParameters) -> Result<()> {
        self.cm.connect(&self.servers).await?;

        let steam_id = SteamId::from_parts(
            Universe::Public,
            AccountType::Individual,
            instance::DESKTOP,
            0,
        );
        info!(account = %params.account_name, "logging in");

        let logon = proto::CMsgClientLogon {
            protocol_version: Some(DEFAULT_PROTOCOL_VERSION),
            client_package_version: Some(DEFAULT_CLIENT_PACKAGE_VERSION),
            account_name: Some(params.account_name),
            password: params.password,
            access_token: params.access_token,
            should_remember_password: Some(params.should_remember_password),
            machine_id: params.machine_id,
            cell_id: params.cell_id,
            obfuscated_private_ip: self.obfuscated_local_ip(),
        };
        self.complete_logon(steam_id, logon).await
    }

    async fn complete_logon(&self, steam_id: SteamId, logon: proto::CMsgClientLogon) -> Result<()> {
        {
            let mut session = self.session_mut();
            session.steam_id = Some(steam_id);
            session.session_id = None;
        }

        let wait = self
            .cm
            .listeners()
            .begin_wait(emsg::CLIENT_LOG_ON_RESPONSE);
        self.send(Message::proto(emsg::CLIENT_LOGON, &logon)).await?;

        let response = self
            .cm
            .listeners()
            .finish_wait(wait, self.cm.config().logon_timeout)
            .await?;

        let body = response.logon_response().ok_or_else(|| {
            ProtocolError::MalformedMessage("ClientLogOnResponse body missing".into())
        })?;
        let result = body.eresult.unwrap_or(eresult::INVALID);
        if result != eresult::OK {
            *self.session_mut() = SessionContext::default();
            self.cm.disconnect().await;
            return Err(ProtocolError::LogonFailure(result));
        }

        {
            let mut session = self.session_mut();
            if let Some(id) = body.client_supplied_steamid {
                session.steam_id = Some(SteamId::from_u64(id));
            }
            session.session_id = response.header.session_id();
            info!(
                steam_id = ?session.steam_id,
                session_id = ?session.session_id,
                "logged on"
            );
        }

        if let Some(interval) = body.heartbeat_seconds.filter(|&s| s > 0) {
            self.start_heartbeat(interval as u64);
        }
        Ok(())
    }

    /// Stamp the session context into the header and send.
    pub async fn send(&self, mut message: Message) -> Result<()> {
        let (steam_id, session_id) = {
            let session = self.session();
            (session.steam_id.map(SteamId::to_u64), session.session_id)
        };
        message.header.set_session(steam_id, session_id);
        self.cm.send(&message).await
    }

    /// Mint a source job id, stamp it, and send without waiting. Returns
    /// the minted id for callers correlating the reply themselves.
    pub async fn send_job(&self, mut message: Message, mut job: Job) -> Result<i64> {
        job.source_job_id = self.cm.jobs().mint_job_id();
        message.header.set_job(&job);
        self.send(message).await?;
        Ok(job.source_job_id)
    }

    /// Job-correlated RPC: send a request and await the reply carrying the
    /// minted job id as its target.
    pub async fn call_job(&self, mut message: Message, mut job: Job) -> Result<Message> {
        job.source_job_id = self.cm.jobs().mint_job_id();
        message.header.set_job(&job);

        let wait = self.cm.jobs().begin_wait(job.source_job_id);
        if let Err(err) = self.send(message).await {
            self.cm.jobs().cancel_wait(wait);
            return Err(err);
        }
        self.cm
            .jobs()
            .finish_wait(wait, self.cm.config().wait_timeout)
            .await
    }

    pub async fn wait_for(&self, emsg: u32, timeout: Duration) -> Result<Message> {
        self.cm.wait_for(emsg, timeout).await
    }

    pub fn listeners(&self) -> &ListenerGroup<u32, Message> {
        self.cm.listeners()
    }

    pub fn jobs(&self) -> &JobHandler<Message> {
        self.cm.jobs()
    }

    pub fn cm(&self) -> &CmClient {
        &self.cm
    }

    /// Session context snapshot.
    pub fn session_context(&self) -> SessionContext {
        self.session().clone()
    }

    /// Connected, encrypted, and logged on.
    pub fn is_connected(&self) -> bool {
        self.cm.is_connected() && self.session().steam_id.is_some()
    }

    pub async fn disconnect(&self) {
        if let Some(task) = self
            .shared
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned")
            .take()
        {
            task.abort();
        }
        *self.session_mut() = SessionContext::default();
        self.cm.disconnect().await;
    }

    fn session(&self) -> std::sync::RwLockReadGuard<'_, SessionContext> {
        self.shared.session.read().expect("session lock poisoned")
    }

    fn session_mut(&self) -> std::sync::RwLockWriteGuard<'_, SessionContext> {
        self.shared.session.write().expect("session lock poisoned")
    }

    fn obfuscated_local_ip(&self) -> Option<proto::CMsgIpAddress> {
        match self.cm.connection().local_addr()? {
            SocketAddr::V4(addr) => Some(proto::CMsgIpAddress {
                ip: Some(proto::ip_address::Ip::V4(obfuscate_ipv4(*addr.ip()))),
            }),
            SocketAddr::V6(_) => None,
        }
    }

    /// Periodic heartbeat at the server-given interval. The body is an
    /// empty logon-response-shaped protobuf sent under the heartbeat EMsg,
    /// a quirk of the protocol rather than a real response.
    fn start_heartbeat(&self, interval_secs: u64) {
        debug!(interval_secs, "starting client heartbeat");
        let client = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            // First tick fires immediately; the beat starts one interval in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                trace!("sending client heartbeat");
                let beat = Message::proto(
                    emsg::CLIENT_HEART_BEAT,
                    &proto::CMsgClientLogonResponse::default(),
                );
                if let Err(err) = client.send(beat).await {
                    warn!(error = %err, "heartbeat failed, stopping");
                    break;
                }
            }
        });

        let mut slot = self
            .shared
            .heartbeat
            .lock()
            .expect("heartbeat lock poisoned");
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }
}

/// The logon message carries the local IPv4 address XOR-masked rather than
/// in the clear.
fn obfuscate_ipv4(addr: Ipv4Addr) -> u32 {
    u32::from(addr) ^ ADDRESS_MASK
}
