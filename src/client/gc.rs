//! # Game Coordinator Relay
//!
//! GC backends are reached through the CM connection: a GC message (its own
//! header and body) rides as the payload of a `CMsgGCClient` inside a
//! ClientToGC/ClientFromGC proto message. This module unwraps inbound
//! relays for one app id and dispatches the inner messages through a
//! listener group of their own, keyed by GC message-type id, so GC and CM
//! id spaces never collide.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::client::steam::SteamClient;
use crate::error::{ProtocolError, Result};
use crate::handler::{ListenerGroup, DEFAULT_LISTENER_PRIORITY};
use crate::message::header::{BasicHeader, GcProtoHeader, Header};
use crate::message::{emsg, Message};
use crate::proto;

/// Legacy (non-proto) GC header: u16 version + two i64 job ids.
const GC_LEGACY_HEADER_SIZE: usize = 18;

/// Relay endpoint for one application's game coordinator.
pub struct GameCoordinator {
    client: SteamClient,
    app_id: u32,
    listeners: Arc<ListenerGroup<u32, Message>>,
}

impl GameCoordinator {
    pub fn new(client: SteamClient, app_id: u32) -> Self {
        let listeners = Arc::new(ListenerGroup::new(
            client.cm().config().dispatch_workers,
        ));

        let group = Arc::clone(&listeners);
        client.listeners().register(
            emsg::CLIENT_FROM_GC,
            DEFAULT_LISTENER_PRIORITY,
            move |message: Message| {
                let relay = message.gc_relay().ok_or_else(|| {
                    ProtocolError::MalformedMessage("ClientFromGC body missing".into())
                })?;
                if relay.appid != Some(app_id) {
                    warn!(
                        got = relay.appid,
                        expected = app_id,
                        "GC message for another app, ignoring"
                    );
                    return Ok(());
                }

                let inner = unwrap_gc(relay)?;
                debug!(gc_emsg = inner.emsg(), "GC message received");

                let key = inner.emsg();
                let group = Arc::clone(&group);
                tokio::spawn(async move {
                    group.dispatch(&key, inner).await;
                });
                Ok(())
            },
        );

        Self {
            client,
            app_id,
            listeners,
        }
    }

    /// Wrap a GC body under its GC-proto header and relay it to the
    /// coordinator of this app.
    pub async fn send(&self, gc_emsg: u32, body: &impl prost::Message) -> Result<()> {
        let gc_header = Header::GcProto(GcProtoHeader::new(gc_emsg, Default::default()));
        let mut payload = gc_header.encode();
        payload.extend_from_slice(&body.encode_to_vec());

        let relay = proto::CMsgGcClient {
            appid: Some(self.app_id),
            msgtype: Some(emsg::set_proto_mask(gc_emsg)),
            payload: Some(payload),
        };

        let mut message = Message::proto(emsg::CLIENT_TO_GC, &relay);
        if let Header::Proto(header) = &mut message.header {
            header.proto_mut().routing_appid = Some(self.app_id);
        }
        self.client.send(message).await
    }

    /// Listener group for unwrapped GC messages, keyed by GC message-type
    /// id.
    pub fn listeners(&self) -> &ListenerGroup<u32, Message> {
        &self.listeners
    }

    pub async fn wait_for(
        &self,
        gc_emsg: u32,
        timeout: std::time::Duration,
    ) -> Result<Message> {
        self.listeners.wait_for(gc_emsg, timeout).await
    }

    pub fn app_id(&self) -> u32 {
        self.app_id
    }
}

/// Decode the GC message nested in a relay payload. Proto-flagged types
/// carry a GC-proto header; legacy types carry the 18-byte fixed header
/// whose message-type id lives in the relay, not the payload.
fn unwrap_gc(relay: &proto::CMsgGcClient) -> Result<Message> {
    let msgtype = relay.msgtype.unwrap_or(0);
    let payload = relay.payload.as_deref().unwrap_or(&[]);

    if emsg::is_proto(msgtype) {
        let header = Header::decode_gc(payload)?;
        let body = Bytes::copy_from_slice(&payload[header.size()..]);
        Ok(Message::from_parts(header, body))
    } else {
        if payload.len() < GC_LEGACY_HEADER_SIZE {
            return Err(ProtocolError::MalformedMessage(
                "GC legacy header truncated".into(),
            ));
        }
        let target_job_id = i64::from_le_bytes(payload[2..10].try_into().unwrap_or([0; 8]));
        let source_job_id = i64::from_le_bytes(payload[10..18].try_into().unwrap_or([0; 8]));
        let header = Header::Basic(BasicHeader {
            emsg: msgtype,
            target_job_id,
            source_job_id,
        });
        let body = Bytes::copy_from_slice(&payload[GC_LEGACY_HEADER_SIZE..]);
        Ok(Message::from_parts(header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::job::JOB_NONE;

    #[test]
    fn unwraps_proto_gc_payload() {
        let gc_header = Header::GcProto(GcProtoHeader::new(
            4004,
            proto::gc::CMsgProtoBufHeader {
                jobid_source: Some(3),
                ..Default::default()
            },
        ));
        let mut payload = gc_header.encode();
        payload.extend_from_slice(b"gc-body");

        let relay = proto::CMsgGcClient {
            appid: Some(730),
            msgtype: Some(emsg::set_proto_mask(4004)),
            payload: Some(payload),
        };

        let inner = unwrap_gc(&relay).unwrap();
        assert_eq!(inner.emsg(), 4004);
        assert_eq!(inner.header.source_job_id(), 3);
        assert_eq!(&inner.body[..], b"gc-body");
    }

    #[test]
    fn unwraps_legacy_gc_payload() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&(-1i64).to_le_bytes());
        payload.extend_from_slice(&(77i64).to_le_bytes());
        payload.extend_from_slice(b"legacy");

        let relay = proto::CMsgGcClient {
            appid: Some(570),
            msgtype: Some(9000),
            payload: Some(payload),
        };

        let inner = unwrap_gc(&relay).unwrap();
        assert_eq!(inner.emsg(), 9000);
        assert_eq!(inner.header.target_job_id(), JOB_NONE);
        assert_eq!(inner.header.source_job_id(), 77);
        assert_eq!(&inner.body[..], b"legacy");
    }

    #[test]
    fn truncated_legacy_header_is_rejected() {
        let relay = proto::CMsgGcClient {
            appid: Some(570),
            msgtype: Some(9000),
            payload: Some(vec![0; 10]),
        };
        assert!(unwrap_gc(&relay).is_err());
    }
}
