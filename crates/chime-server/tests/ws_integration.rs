//! End-to-end tests against a bound server using a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chime_core::{ChannelId, ChannelMessage, MessageId};
use chime_server::{ChimeServer, ConnectionConfig, JwtAdmission, OpenChannelAccess, ServerConfig};
use futures::StreamExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

const TIMEOUT: Duration = Duration::from_secs(5);
const SECRET: &str = "integration-secret";

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn token(user: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "userID": user, "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn boot_server(connection: ConnectionConfig) -> (SocketAddr, ChimeServer) {
    let config = ServerConfig {
        connection,
        ..ServerConfig::default()
    };
    let admission = JwtAdmission::new(SECRET, "userID", Arc::new(OpenChannelAccess));
    let server = ChimeServer::new(config, Arc::new(admission), None);
    let addr = server.listen().await.unwrap();
    (addr, server)
}

async fn connect(addr: SocketAddr, channel: &str, user: &str) -> WsStream {
    let url = format!("ws://{addr}/ws/channels/{channel}?token={}", token(user));
    let (ws, _) = timeout(TIMEOUT, connect_async(url))
        .await
        .unwrap()
        .unwrap();
    ws
}

async fn wait_for_members(server: &ChimeServer, channel: &str, expected: usize) {
    let channel = ChannelId::from(channel);
    timeout(TIMEOUT, async {
        while server
            .hub()
            .channel_connection_count(&channel)
            .await
            .unwrap()
            != expected
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("channel {channel} never reached {expected} members"));
}

/// Read frames until a text frame arrives.
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn broadcast_reaches_channel_subscribers_only() {
    let (addr, server) = boot_server(ConnectionConfig::default()).await;
    let mut alice = connect(addr, "general", "alice").await;
    let mut bob = connect(addr, "general", "bob").await;
    let mut carol = connect(addr, "random", "carol").await;
    wait_for_members(&server, "general", 2).await;
    wait_for_members(&server, "random", 1).await;

    let msg = ChannelMessage::new("msg1", "general", "alice", "hello");
    let report = server
        .broadcaster()
        .notify_created(&ChannelId::from("general"), msg)
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);

    for ws in [&mut alice, &mut bob] {
        let json = next_json(ws).await;
        assert_eq!(json["type"], "message");
        assert_eq!(json["message"]["id"], "msg1");
        assert_eq!(json["message"]["content"], "hello");
    }
    assert!(
        timeout(Duration::from_millis(200), carol.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn envelopes_arrive_in_order_as_separate_frames() {
    let (addr, server) = boot_server(ConnectionConfig::default()).await;
    let mut ws = connect(addr, "general", "alice").await;
    wait_for_members(&server, "general", 1).await;

    let broadcaster = server.broadcaster();
    let general = ChannelId::from("general");
    for n in 0..10 {
        let _ = broadcaster
            .notify_deleted(&general, MessageId::from(format!("m{n}")))
            .await
            .unwrap();
    }

    for n in 0..10 {
        let json = next_json(&mut ws).await;
        assert_eq!(json["type"], "message_delete");
        assert_eq!(json["messageId"], format!("m{n}"));
        assert!(json.get("message").is_none());
    }
}

#[tokio::test]
async fn missing_token_is_rejected_before_upgrade() {
    let (addr, server) = boot_server(ConnectionConfig::default()).await;
    let result = connect_async(format!("ws://{addr}/ws/channels/general")).await;

    assert_matches!(
        result,
        Err(tungstenite::Error::Http(resp)) if resp.status() == 401
    );
    assert_eq!(server.hub().total_connection_count().await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_token_is_rejected_before_upgrade() {
    let (addr, _server) = boot_server(ConnectionConfig::default()).await;
    let result = connect_async(format!("ws://{addr}/ws/channels/general?token=garbage")).await;
    assert_matches!(
        result,
        Err(tungstenite::Error::Http(resp)) if resp.status() == 401
    );
}

#[tokio::test]
async fn client_close_unregisters() {
    let (addr, server) = boot_server(ConnectionConfig::default()).await;
    let mut alice = connect(addr, "general", "alice").await;
    let bob = connect(addr, "general", "bob").await;
    wait_for_members(&server, "general", 2).await;

    alice.close(None).await.unwrap();
    wait_for_members(&server, "general", 1).await;

    drop(bob);
    wait_for_members(&server, "general", 0).await;
    assert_eq!(server.hub().channel_count().await.unwrap(), 0);
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_deadline() {
    let connection = ConnectionConfig {
        write_wait: Duration::from_millis(200),
        ping_period: Duration::from_millis(200),
        pong_wait: Duration::from_millis(300),
        ..ConnectionConfig::default()
    };
    let (addr, server) = boot_server(connection).await;

    // Never polled, so pings are never answered.
    let _silent = connect(addr, "general", "alice").await;
    wait_for_members(&server, "general", 1).await;

    wait_for_members(&server, "general", 0).await;
}

#[tokio::test]
async fn server_close_sends_close_frame() {
    let (addr, server) = boot_server(ConnectionConfig::default()).await;
    let mut ws = connect(addr, "general", "alice").await;
    wait_for_members(&server, "general", 1).await;

    // Stopping the hub closes every member.
    server.shutdown().shutdown_and_wait(Some(TIMEOUT)).await;

    let closed = timeout(TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => {}
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
}
