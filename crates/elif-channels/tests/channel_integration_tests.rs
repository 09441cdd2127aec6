//! End-to-end channel tests
//!
//! These tests serve real channels over TCP and talk to them with a
//! tokio-tungstenite client.

use elif_channels::testing::TestServer;
use elif_channels::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(2);

async fn next_text(socket: &mut TestSocket) -> Option<String> {
    loop {
        let message = timeout(WAIT, socket.next()).await.ok()??.ok()?;
        match message {
            Message::Text(text) => return Some(text.to_string()),
            Message::Binary(data) => return String::from_utf8(data.to_vec()).ok(),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            Message::Close(_) => return None,
        }
    }
}

async fn wait_for_clients(channel: &Channel, expected: usize) -> bool {
    for _ in 0..200 {
        if channel.client_count().await.unwrap() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_welcome_message_on_connect() {
    let registry = ChannelRegistry::new();
    registry
        .register_channel("welcome", "/ws", |client: &SocketClient, event: ChannelEvent| {
            if event.is_connect() {
                let _ = client.send_raw("hello client");
            }
        })
        .unwrap();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let (mut socket, _) = connect_async(server.ws_url("/ws")).await.unwrap();

    assert_eq!(next_text(&mut socket).await.as_deref(), Some("hello client"));
}

#[tokio::test]
async fn test_echo_round_trip() {
    let registry = ChannelRegistry::new();
    let channel = registry
        .register_channel("echo", "/echo", |client: &SocketClient, event: ChannelEvent| {
            if event.is_message() {
                let _ = client.send_raw(event.data());
            }
        })
        .unwrap();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let (mut socket, _) = connect_async(server.ws_url("/echo")).await.unwrap();
    socket
        .send(Message::Text("this is a test".into()))
        .await
        .unwrap();

    assert_eq!(next_text(&mut socket).await.as_deref(), Some("this is a test"));

    let clients = channel.clients().await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].info().path, "/echo");
    assert!(clients[0].info().remote_addr.is_some());
    assert_eq!(clients[0].stats().messages_received, 1);
}

#[tokio::test]
async fn test_structured_broadcast() {
    let registry = ChannelRegistry::new();
    registry
        .register_channel("news", "/news", |_: &SocketClient, _: ChannelEvent| {})
        .unwrap();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let (mut first, _) = connect_async(server.ws_url("/news")).await.unwrap();
    let (mut second, _) = connect_async(server.ws_url("/news")).await.unwrap();

    let channel = registry.channel("news").unwrap();
    assert!(wait_for_clients(&channel, 2).await);
    channel.broadcast(&json!({"test": "test"})).unwrap();

    assert_eq!(next_text(&mut first).await.as_deref(), Some(r#"{"test":"test"}"#));
    assert_eq!(next_text(&mut second).await.as_deref(), Some(r#"{"test":"test"}"#));
}

#[tokio::test]
async fn test_room_broadcast_stays_in_room() {
    let registry = ChannelRegistry::new();
    let channel = registry
        .register_channel("rooms", "/rooms", |client: &SocketClient, event: ChannelEvent| {
            if event.is_connect() {
                if let Some(room) = client
                    .info()
                    .query
                    .as_deref()
                    .and_then(|query| query.strip_prefix("room="))
                {
                    client.channel().join(room, client);
                }
            } else if event.is_message() {
                for room in client.rooms() {
                    room.broadcast_raw(event.data());
                }
            }
        })
        .unwrap();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let (mut alice, _) = connect_async(server.ws_url("/rooms?room=red")).await.unwrap();
    let (mut bob, _) = connect_async(server.ws_url("/rooms?room=red")).await.unwrap();
    let (mut carol, _) = connect_async(server.ws_url("/rooms?room=blue")).await.unwrap();
    assert!(wait_for_clients(&channel, 3).await);
    assert_eq!(channel.room("red").len(), 2);

    alice.send(Message::Text("hi red".into())).await.unwrap();

    assert_eq!(next_text(&mut alice).await.as_deref(), Some("hi red"));
    assert_eq!(next_text(&mut bob).await.as_deref(), Some("hi red"));
    assert!(timeout(Duration::from_millis(200), carol.next()).await.is_err());
}

#[tokio::test]
async fn test_client_close_deregisters() {
    let recorder = testing::RecordingHandler::new();
    let registry = ChannelRegistry::new();
    let channel = registry
        .register_channel("closing", "/closing", recorder.clone())
        .unwrap();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let (mut socket, _) = connect_async(server.ws_url("/closing")).await.unwrap();
    assert!(wait_for_clients(&channel, 1).await);

    socket
        .close(Some(WsCloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    assert!(recorder.wait_for(ChannelEventType::Disconnect, 1, WAIT).await);
    assert!(wait_for_clients(&channel, 0).await);
    assert_eq!(
        recorder.kinds(),
        vec![ChannelEventType::Connect, ChannelEventType::Disconnect]
    );
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let recorder = testing::RecordingHandler::new();
    let registry = ChannelRegistry::with_config(ChannelConfig::default().with_max_message_size(16));
    let channel = registry
        .register_channel("small", "/small", recorder.clone())
        .unwrap();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let (mut socket, _) = connect_async(server.ws_url("/small")).await.unwrap();
    assert!(wait_for_clients(&channel, 1).await);

    // The server may tear down before the send completes.
    let _ = socket.send(Message::Text("x".repeat(64).into())).await;

    assert!(recorder.wait_for(ChannelEventType::Disconnect, 1, WAIT).await);
    assert!(recorder.messages().is_empty());
}

#[tokio::test]
async fn test_accept_on_raw_tcp_stream() {
    let channel = Channel::open("raw", |client: &SocketClient, event: ChannelEvent| {
        if event.is_message() {
            let _ = client.send(&json!({"echo": event.text()}));
        }
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept_channel = channel.clone();
    tokio::spawn(async move {
        let (stream, remote) = listener.accept().await.unwrap();
        let info = ClientInfo::new("/").with_remote_addr(remote);
        SocketClient::accept(&accept_channel, stream, info).await.unwrap();
    });

    let (mut socket, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    socket.send(Message::Text("ping".into())).await.unwrap();

    assert_eq!(next_text(&mut socket).await.as_deref(), Some(r#"{"echo":"ping"}"#));
}
