//! Chat server demo
//!
//! Serves a chat channel at ws://127.0.0.1:3000/chat. Connect with
//! `?room=<name>` to join a room; messages starting with `/all ` go to every
//! client, anything else goes to the rooms you are in.
//!
//! Try it with `websocat ws://127.0.0.1:3000/chat?room=lobby`.

use elif_channels::logging::{init_logging, log_shutdown_info, log_startup_info, LoggingConfig};
use elif_channels::{ChannelConfig, ChannelEvent, ChannelRegistry, ChannelServer, SocketClient};
use serde_json::json;
use tokio::net::TcpListener;

fn chat(client: &SocketClient, event: ChannelEvent) {
    if event.is_connect() {
        let room = client
            .info()
            .query
            .as_deref()
            .and_then(|query| query.strip_prefix("room="))
            .unwrap_or("lobby")
            .to_string();
        client.channel().join(&room, client);
        let _ = client.send(&json!({"event": "joined", "room": room, "id": client.id()}));
        return;
    }

    if !event.is_message() {
        return;
    }
    let Some(text) = event.text() else {
        return;
    };

    if let Some(shout) = text.strip_prefix("/all ") {
        let _ = client
            .channel()
            .broadcast(&json!({"from": client.id(), "text": shout}));
    } else {
        for room in client.rooms() {
            let _ = room.broadcast(&json!({"from": client.id(), "room": room.name(), "text": text}));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LoggingConfig::development().with_service("chat-server", "0.1.0"))?;
    log_startup_info("chat-server", "0.1.0");

    let config = ChannelConfig::from_env()?;
    let registry = ChannelRegistry::with_config(config);
    registry.register_channel("chat", "/chat", chat)?;

    let mut server = ChannelServer::new(registry);
    server.start_room_pruning(60);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    log_shutdown_info("chat-server");
    Ok(())
}
