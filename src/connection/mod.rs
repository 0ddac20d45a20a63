//! # TCP Connection
//!
//! Framed, optionally encrypted TCP transport to a CM server. A connection
//! owns the socket, a background read loop, and the two dispatch surfaces
//! inbound messages fan out through:
//!
//! - a [`ListenerGroup`] keyed by message-type id
//! - a [`JobHandler`] keyed by the target job id stamped in reply headers
//!
//! Once a session key is installed every outbound payload is encrypted and
//! every inbound payload decrypted and authenticated before parsing.
//! Container messages (`Multi`) are unpacked inline, decompressed when
//! flagged, and each sub-message re-enters the same dispatch path.
//!
//! Losing the connection fails all pending waits; callers see
//! [`ProtocolError::ConnectionClosed`] rather than hanging until timeout.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::{SinkExt, StreamExt};
use std::io::Read;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::codec::FrameCodec;
use crate::crypto::SessionKey;
use crate::error::{ProtocolError, Result};
use crate::handler::{JobHandler, ListenerGroup};
use crate::message::job::JOB_NONE;
use crate::message::registry::MessageRegistry;
use crate::message::{emsg, Message};
use crate::proto;

type Writer = FramedWrite<OwnedWriteHalf, FrameCodec>;

struct Shared {
    listeners: ListenerGroup<u32, Message>,
    jobs: JobHandler<Message>,
    registry: MessageRegistry,
    session_key: RwLock<Option<SessionKey>>,
    writer: Mutex<Option<Writer>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
    connected: AtomicBool,
}

/// A connection to one CM server. Cheap to clone; clones share the socket
/// and dispatch state.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub fn new(dispatch_workers: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                listeners: ListenerGroup::new(dispatch_workers),
                jobs: JobHandler::new(dispatch_workers),
                registry: MessageRegistry::new(),
                session_key: RwLock::new(None),
                writer: Mutex::new(None),
                reader: StdMutex::new(None),
                local_addr: RwLock::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Open the socket and start the read loop. Fails with
    /// [`ProtocolError::AlreadyConnected`] if a socket is already open.
    #[instrument(skip(self))]
    pub async fn connect(&self, addr: SocketAddr) -> Result<()> {
        if self.shared.connected.swap(true, Ordering::SeqCst) {
            return Err(ProtocolError::AlreadyConnected);
        }

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                self.shared.connected.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        let local = stream.local_addr()?;
        let (read_half, write_half) = stream.into_split();

        *lock_write(&self.shared.local_addr) = Some(local);
        *self.shared.writer.lock().await = Some(FramedWrite::new(write_half, FrameCodec));

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(read_loop(shared, read_half));
        *self
            .shared
            .reader
            .lock()
            .expect("connection state lock poisoned") = Some(task);

        info!(%addr, "connected");
        Ok(())
    }

    /// Close the socket and fail every pending wait. Safe to call twice.
    pub async fn disconnect(&self) {
        // Stop the read loop first: its socket only reaches EOF when the
        // peer closes, and a stale loop must not tear down a reconnect.
        if let Some(task) = self
            .shared
            .reader
            .lock()
            .expect("connection state lock poisoned")
            .take()
        {
            task.abort();
        }
        self.shared.writer.lock().await.take();
        teardown(&self.shared);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// True once a session key is installed and traffic is encrypted.
    pub fn is_encrypted(&self) -> bool {
        lock_read(&self.shared.session_key).is_some()
    }

    /// Install the negotiated session key. All traffic from this point on
    /// is encrypted.
    pub fn set_session_key(&self, key: SessionKey) {
        *lock_write(&self.shared.session_key) = Some(key);
        debug!("session key installed, channel encrypted");
    }

    /// Local socket address of the active connection.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock_read(&self.shared.local_addr)
    }

    pub fn listeners(&self) -> &ListenerGroup<u32, Message> {
        &self.shared.listeners
    }

    pub fn jobs(&self) -> &JobHandler<Message> {
        &self.shared.jobs
    }

    /// Encode, encrypt when a key is installed, and write one message.
    #[instrument(skip(self, message), fields(emsg = emsg::name(message.emsg())))]
    pub async fn send(&self, message: &Message) -> Result<()> {
        let plain = message.encode();
        let payload = match lock_read(&self.shared.session_key).as_ref() {
            Some(key) => key.encrypt(&plain)?,
            None => plain,
        };

        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        writer.send(Bytes::from(payload)).await?;
        trace!(bytes = message.body.len(), "message sent");
        Ok(())
    }

    /// One-shot wait for the next message of a given type.
    pub async fn wait_for(&self, emsg: u32, timeout: Duration) -> Result<Message> {
        self.shared.listeners.wait_for(emsg, timeout).await
    }
}

fn lock_read<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
    lock.read().expect("connection state lock poisoned")
}

fn lock_write<'a, T>(lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
    lock.write().expect("connection state lock poisoned")
}

/// Clear connection state and wake every pending wait. Idempotent.
fn teardown(shared: &Shared) {
    if shared.connected.swap(false, Ordering::SeqCst) {
        info!("connection closed");
    }
    *lock_write(&shared.session_key) = None;
    *lock_write(&shared.local_addr) = None;
    shared.listeners.fail_all();
    shared.jobs.fail_all();
}

async fn read_loop(shared: Arc<Shared>, read_half: OwnedReadHalf) {
    let mut frames = FramedRead::new(read_half, FrameCodec);

    while let Some(frame) = frames.next().await {
        let payload = match frame {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "read loop terminating");
                break;
            }
        };

        let plain = {
            let key = lock_read(&shared.session_key);
            match key.as_ref() {
                Some(key) => match key.decrypt(&payload) {
                    Ok(plain) => plain,
                    Err(err) => {
                        error!(error = %err, "payload failed decryption, closing");
                        break;
                    }
                },
                None => payload.to_vec(),
            }
        };

        if let Err(err) = process_plain(&shared, &plain).await {
            warn!(error = %err, "inbound message dropped");
        }
    }

    teardown(&shared);
}

/// Parse and dispatch one plaintext payload. `Multi` containers recurse;
/// their sub-messages are never individually encrypted.
fn process_plain<'a>(
    shared: &'a Shared,
    plain: &'a [u8],
) -> futures::future::BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let message = Message::from_bytes(plain, &shared.registry)?;
        trace!(emsg = emsg::name(message.emsg()), "message received");

        if message.emsg() == emsg::MULTI {
            let multi = message
                .multi()
                .ok_or_else(|| ProtocolError::MalformedMessage("Multi body missing".into()))?;
            for sub in split_multi(multi)? {
                if let Err(err) = process_plain(shared, &sub).await {
                    warn!(error = %err, "sub-message dropped");
                }
            }
            return Ok(());
        }

        let target_job = message.header.target_job_id();
        if target_job != JOB_NONE {
            shared.jobs.complete(target_job, message.clone()).await;
        }
        shared.listeners.dispatch(&message.emsg(), message).await;
        Ok(())
    })
}

/// Split a `Multi` container into its sub-message payloads. The body is a
/// sequence of `u32 length (LE) ++ payload`, gzip-compressed as a whole
/// when `size_unzipped` is non-zero.
pub(crate) fn split_multi(multi: &proto::CMsgMulti) -> Result<Vec<Vec<u8>>> {
    let body = multi.message_body.as_deref().unwrap_or(&[]);

    let unpacked;
    let mut data: &[u8] = match multi.size_unzipped {
        Some(size) if size > 0 => {
            if size as usize > MAX_PAYLOAD_SIZE {
                return Err(ProtocolError::OversizedPacket(size as usize));
            }
            // The claimed size is untrusted; cap what actually inflates too.
            let mut decoder = GzDecoder::new(body).take(MAX_PAYLOAD_SIZE as u64 + 1);
            let mut buf = Vec::with_capacity(size as usize);
            decoder
                .read_to_end(&mut buf)
                .map_err(|_| ProtocolError::MalformedMessage("bad gzip in Multi".into()))?;
            if buf.len() > MAX_PAYLOAD_SIZE {
                return Err(ProtocolError::OversizedPacket(buf.len()));
            }
            unpacked = buf;
            &unpacked
        }
        _ => body,
    };

    let mut subs = Vec::new();
    while !data.is_empty() {
        if data.len() < 4 {
            return Err(ProtocolError::MalformedMessage(
                "truncated sub-message length".into(),
            ));
        }
        let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + length {
            return Err(ProtocolError::MalformedMessage(
                "truncated sub-message payload".into(),
            ));
        }
        subs.push(data[4..4 + length].to_vec());
        data = &data[4 + length..];
    }
    Ok(subs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn multi_body(subs: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        for sub in subs {
            body.extend_from_slice(&(sub.len() as u32).to_le_bytes());
            body.extend_from_slice(sub);
        }
        body
    }

    #[test]
    fn split_plain_multi() {
        let multi = proto::CMsgMulti {
            size_unzipped: None,
            message_body: Some(multi_body(&[b"first", b"second"])),
        };
        assert_eq!(
            split_multi(&multi).unwrap(),
            vec![b"first".to_vec(), b"second".to_vec()]
        );
    }

    #[test]
    fn split_gzipped_multi() {
        let body = multi_body(&[b"compressed", b"payloads"]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).unwrap();
        let compressed = encoder.finish().unwrap();

        let multi = proto::CMsgMulti {
            size_unzipped: Some(body.len() as u32),
            message_body: Some(compressed),
        };
        assert_eq!(
            split_multi(&multi).unwrap(),
            vec![b"compressed".to_vec(), b"payloads".to_vec()]
        );
    }

    #[test]
    fn empty_multi_yields_nothing() {
        let multi = proto::CMsgMulti {
            size_unzipped: None,
            message_body: None,
        };
        assert!(split_multi(&multi).unwrap().is_empty());
    }

    #[test]
    fn gzip_inflating_past_the_cap_is_rejected() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&vec![0u8; MAX_PAYLOAD_SIZE + 1]).unwrap();
        let compressed = encoder.finish().unwrap();

        // A small claimed size must not bypass the inflation cap.
        let multi = proto::CMsgMulti {
            size_unzipped: Some(64),
            message_body: Some(compressed),
        };
        assert!(matches!(
            split_multi(&multi),
            Err(ProtocolError::OversizedPacket(_))
        ));
    }

    #[test]
    fn truncated_sub_message_is_rejected() {
        let mut body = multi_body(&[b"ok"]);
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(b"short");

        let multi = proto::CMsgMulti {
            size_unzipped: None,
            message_body: Some(body),
        };
        assert!(split_multi(&multi).is_err());
    }

    #[tokio::test]
    async fn send_without_socket_reports_not_connected() {
        let conn = Connection::new(4);
        let message = Message::proto(
            emsg::CLIENT_HEART_BEAT,
            &proto::CMsgClientHeartBeat { send_reply: None },
        );
        assert!(matches!(
            conn.send(&message).await,
            Err(ProtocolError::NotConnected)
        ));
    }
}
