#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end channel-encryption handshake against a scripted CM server
//! over TCP loopback.

use std::time::Duration;

use steam_wire::client::CmClient;
use steam_wire::config::{ClientConfig, PACKET_MAGIC};
use steam_wire::crypto;
use steam_wire::message::registry::MessageRegistry;
use steam_wire::message::structs::{
    ChannelEncryptRequest, ChannelEncryptResult,
};
use steam_wire::message::{emsg, eresult, Message};
use steam_wire::types::CmServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await
        .unwrap();
    stream.write_all(&PACKET_MAGIC.to_le_bytes()).await.unwrap();
    stream.write_all(payload).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    let length = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let magic = u32::from_le_bytes(header[4..8].try_into().unwrap());
    assert_eq!(magic, PACKET_MAGIC);

    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

#[tokio::test]
async fn handshake_produces_valid_response_and_encrypts_the_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let registry = MessageRegistry::new();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        // 1. Challenge the client.
        let request = Message::structured(
            emsg::CHANNEL_ENCRYPT_REQUEST,
            &ChannelEncryptRequest {
                protocol_version: 1,
                universe: 1,
                challenge: vec![0u8; 16],
            },
        );
        write_frame(&mut stream, &request.encode()).await;

        // 2. Validate the response.
        let payload = read_frame(&mut stream).await;
        let response = Message::from_bytes(&payload, &registry).unwrap();
        assert_eq!(response.emsg(), emsg::CHANNEL_ENCRYPT_RESPONSE);

        let body = response.channel_encrypt_response().unwrap();
        assert_eq!(body.protocol_version, 1);
        assert_eq!(body.key_size, 128);
        assert_eq!(body.key.len(), 128);
        assert_eq!(body.crc32, crypto::crc32(&body.key));
        assert_eq!(body.unknown, 0);

        // 3. Accept the key.
        let result = Message::structured(
            emsg::CHANNEL_ENCRYPT_RESULT,
            &ChannelEncryptResult {
                result: eresult::OK,
            },
        );
        write_frame(&mut stream, &result.encode()).await;

        // 4. The next frame from the client must be encrypted.
        let encrypted = read_frame(&mut stream).await;
        encrypted
    });

    let client = CmClient::new(ClientConfig {
        handshake_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    });
    client
        .connect(&[CmServer::new("127.0.0.1", port)])
        .await
        .unwrap();
    assert!(client.is_connected());
    assert!(client.connection().is_encrypted());

    let heartbeat = Message::proto(
        emsg::CLIENT_HEART_BEAT,
        &steam_wire::proto::CMsgClientHeartBeat { send_reply: None },
    );
    let plaintext = heartbeat.encode();
    client.send(&heartbeat).await.unwrap();

    let on_the_wire = server.await.unwrap();
    assert_ne!(on_the_wire, plaintext);
    // ECB IV block plus at least one padded CBC block.
    assert!(on_the_wire.len() >= plaintext.len() + 16);
    let leading = u32::from_le_bytes(on_the_wire[0..4].try_into().unwrap());
    assert_ne!(
        leading,
        emsg::set_proto_mask(emsg::CLIENT_HEART_BEAT),
        "payload leaked in plaintext"
    );

    client.disconnect().await;
}

#[tokio::test]
async fn refused_encrypt_result_fails_the_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = Message::structured(
            emsg::CHANNEL_ENCRYPT_REQUEST,
            &ChannelEncryptRequest {
                protocol_version: 1,
                universe: 1,
                challenge: vec![7u8; 16],
            },
        );
        write_frame(&mut stream, &request.encode()).await;
        let _response = read_frame(&mut stream).await;

        let result = Message::structured(
            emsg::CHANNEL_ENCRYPT_RESULT,
            &ChannelEncryptResult {
                result: eresult::FAIL,
            },
        );
        write_frame(&mut stream, &result.encode()).await;
        // Hold the socket open so the client decides on the verdict alone.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let client = CmClient::new(ClientConfig {
        handshake_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    });
    let err = client
        .connect(&[CmServer::new("127.0.0.1", port)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        steam_wire::ProtocolError::HandshakeError(_)
    ));
    assert!(!client.connection().is_encrypted());
}

#[tokio::test]
async fn silent_server_times_out_and_tears_the_connection_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = Message::structured(
            emsg::CHANNEL_ENCRYPT_REQUEST,
            &ChannelEncryptRequest {
                protocol_version: 1,
                universe: 1,
                challenge: vec![0u8; 16],
            },
        );
        write_frame(&mut stream, &request.encode()).await;
        // Swallow the response and never send a result.
        let _response = read_frame(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = CmClient::new(ClientConfig {
        handshake_timeout: Duration::from_millis(300),
        ..ClientConfig::default()
    });
    let servers = [CmServer::new("127.0.0.1", port)];
    let err = client.connect(&servers).await.unwrap_err();
    assert!(matches!(err, steam_wire::ProtocolError::Timeout));
    assert!(!client.is_connected());

    // A retry must get a fresh attempt, not a stuck-connected error.
    let retry = client.connect(&servers).await.unwrap_err();
    assert!(!matches!(
        retry,
        steam_wire::ProtocolError::AlreadyConnected
    ));
}

#[tokio::test]
async fn sends_are_rejected_before_the_handshake_completes() {
    let client = CmClient::new(ClientConfig::default());
    let message = Message::proto(
        emsg::CLIENT_HEART_BEAT,
        &steam_wire::proto::CMsgClientHeartBeat { send_reply: None },
    );
    assert!(matches!(
        client.send(&message).await,
        Err(steam_wire::ProtocolError::NotEncrypted)
    ));
}
