#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Connection-level behavior over TCP loopback: multi-message splitting,
//! raw preservation of unknown message types, and disconnect semantics.

use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use steam_wire::config::PACKET_MAGIC;
use steam_wire::connection::Connection;
use steam_wire::message::{emsg, Message};
use steam_wire::proto;
use steam_wire::ProtocolError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&PACKET_MAGIC.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn multi_of(inner: &[Vec<u8>], gzip: bool) -> Vec<u8> {
    let mut body = Vec::new();
    for message in inner {
        body.extend_from_slice(&(message.len() as u32).to_le_bytes());
        body.extend_from_slice(message);
    }

    let multi = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).unwrap();
        proto::CMsgMulti {
            size_unzipped: Some(body.len() as u32),
            message_body: Some(encoder.finish().unwrap()),
        }
    } else {
        proto::CMsgMulti {
            size_unzipped: None,
            message_body: Some(body),
        }
    };
    Message::proto(emsg::MULTI, &multi).encode()
}

#[tokio::test]
async fn multi_splits_into_individual_dispatches_with_bytes_intact() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let first = Message::proto(
        emsg::CLIENT_PERSONA_STATE,
        &proto::CMsgClientHeartBeat {
            send_reply: Some(true),
        },
    );
    let second = Message::proto(
        emsg::CLIENT_CHANGE_STATUS,
        &proto::CMsgClientHeartBeat {
            send_reply: Some(false),
        },
    );
    let first_body = first.body.to_vec();
    let second_body = second.body.to_vec();

    let payload = multi_of(&[first.encode(), second.encode()], false);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&frame(&payload)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let connection = Connection::new(4);
    let seen: Arc<Mutex<Vec<(u32, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    for key in [emsg::CLIENT_PERSONA_STATE, emsg::CLIENT_CHANGE_STATUS] {
        let seen = Arc::clone(&seen);
        connection.listeners().register(key, 0, move |message: Message| {
            seen.lock().unwrap().push((message.emsg(), message.body.to_vec()));
            Ok(())
        });
    }
    let wait_first = connection.listeners().begin_wait(emsg::CLIENT_PERSONA_STATE);
    let wait_second = connection.listeners().begin_wait(emsg::CLIENT_CHANGE_STATUS);

    connection.connect(addr).await.unwrap();
    let got_first = connection
        .listeners()
        .finish_wait(wait_first, Duration::from_secs(5))
        .await
        .unwrap();
    let got_second = connection
        .listeners()
        .finish_wait(wait_second, Duration::from_secs(5))
        .await
        .unwrap();

    // Unknown ids stay raw and byte-exact.
    assert!(got_first.body().is_none());
    assert_eq!(got_first.body.to_vec(), first_body);
    assert_eq!(got_second.body.to_vec(), second_body);

    // Each wait resolves after its key's listener ran; listeners for
    // different keys run on the pool with no cross-key ordering.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&(emsg::CLIENT_PERSONA_STATE, first_body)));
    assert!(seen.contains(&(emsg::CLIENT_CHANGE_STATUS, second_body)));

    connection.disconnect().await;
}

#[tokio::test]
async fn gzipped_multi_is_decompressed_before_splitting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let inner = Message::proto(
        emsg::CLIENT_PERSONA_STATE,
        &proto::CMsgClientHeartBeat {
            send_reply: Some(true),
        },
    );
    let inner_body = inner.body.to_vec();
    let payload = multi_of(&[inner.encode()], true);

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&frame(&payload)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let connection = Connection::new(4);
    let wait = connection.listeners().begin_wait(emsg::CLIENT_PERSONA_STATE);
    connection.connect(addr).await.unwrap();

    let got = connection
        .listeners()
        .finish_wait(wait, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(got.body.to_vec(), inner_body);

    connection.disconnect().await;
}

#[tokio::test]
async fn disconnect_fails_pending_waits_instead_of_hanging() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stream);
    });

    let connection = Connection::new(4);
    connection.connect(addr).await.unwrap();

    let err = connection
        .wait_for(emsg::CLIENT_LOG_ON_RESPONSE, Duration::from_secs(30))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn connect_twice_is_a_state_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let connection = Connection::new(4);
    connection.connect(addr).await.unwrap();
    assert!(matches!(
        connection.connect(addr).await,
        Err(ProtocolError::AlreadyConnected)
    ));
    connection.disconnect().await;
}

#[tokio::test]
async fn bad_magic_terminates_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&4u32.to_le_bytes()).await.unwrap();
        stream.write_all(&0xDEADBEEFu32.to_le_bytes()).await.unwrap();
        stream.write_all(&[0u8; 4]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let connection = Connection::new(4);
    connection.connect(addr).await.unwrap();

    let err = connection
        .wait_for(emsg::CLIENT_LOG_ON_RESPONSE, Duration::from_secs(30))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}
