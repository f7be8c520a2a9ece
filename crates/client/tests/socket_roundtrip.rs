//! End-to-end checks against a real WebSocket server on localhost.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use ticketdesk_client::storage::{MemoryStorage, Storage};
use ticketdesk_client::ws::{
    self, RoomAddress, RoomOptions, SocketEvent, SocketOptions, TungsteniteConnector,
};
use ticketdesk_client::{init_with, HttpUploader, SessionPhase, WidgetConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(Duration::from_secs(10), listener.accept())
        .await
        .expect("no connection within 10s")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_text(ws: &mut ServerSocket) -> String {
    loop {
        let msg = timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("no frame within 10s")
            .expect("client disconnected")
            .unwrap();
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SocketEvent>) -> SocketEvent {
    timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no event within 10s")
        .expect("socket gone")
}

fn fast_options() -> SocketOptions {
    SocketOptions::default()
        .with_min_reconnection_delay(Duration::from_millis(50))
        .with_max_reconnection_delay(Duration::from_millis(200))
        .with_connection_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn queued_payloads_survive_a_server_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    let address = RoomAddress::resolve(&RoomOptions::new(host, "room")).unwrap();
    assert!(address.base_url.starts_with("ws://127.0.0.1:"));

    let (socket, mut events) = ws::connect(
        address.url_provider,
        Arc::new(TungsteniteConnector),
        fast_options(),
    );

    let mut first = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, SocketEvent::Open);

    first.send(Message::text("hello")).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Message("hello".into())
    );

    first.close(None).await.unwrap();
    drop(first);
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::Close { .. }
    ));

    for n in 1..=3 {
        socket.send(format!("queued-{n}"));
    }

    let mut second = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, SocketEvent::Open);
    socket.send("fresh");

    for expected in ["queued-1", "queued-2", "queued-3", "fresh"] {
        assert_eq!(next_text(&mut second).await, expected);
    }

    socket.close(1000, "done");
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::Close { code: 1000, .. }
    ));
}

#[tokio::test]
async fn widget_joins_and_sends_over_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = WidgetConfig::new("bot");
    config.host = listener.local_addr().unwrap().to_string();
    config.socket = fast_options();

    let storage = MemoryStorage::new();
    let widget = init_with(
        config,
        Arc::new(storage.clone()),
        Arc::new(TungsteniteConnector),
        Arc::new(HttpUploader::new("http://127.0.0.1:9/upload")),
    )
    .unwrap();

    let mut server = accept(&listener).await;
    let join: Value = serde_json::from_str(&next_text(&mut server).await).unwrap();
    assert_eq!(join["type"], "session:join");

    let joined = json!({
        "type": "session:joined",
        "data": {
            "session_id": "s1",
            "client_id": "c1",
            "messages": [
                {"id": "m_a", "from": "agent", "type": "text", "content": "Welcome back", "timestamp": 1}
            ],
            "session": {"session_id": "s1", "email": "a@b.c"},
            "config": {"color": "#ff0000"}
        }
    });
    server.send(Message::text(joined.to_string())).await.unwrap();

    let mut state = widget.state();
    let snapshot = timeout(
        Duration::from_secs(10),
        state.wait_for(|s| s.phase == SessionPhase::Active),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.config.color, "#ff0000");
    assert_eq!(storage.get("ti_bot_client_id").as_deref(), Some("c1"));

    widget.send_message("hi there");
    let sent: Value = serde_json::from_str(&next_text(&mut server).await).unwrap();
    assert_eq!(sent["type"], "message:new");
    assert_eq!(sent["session_id"], "s1");
    assert_eq!(sent["message"]["content"], "hi there");

    let read = json!({
        "type": "message:read",
        "data": {"message_id": sent["message"]["id"], "status": "read"}
    });
    server.send(Message::text(read.to_string())).await.unwrap();
    timeout(
        Duration::from_secs(10),
        state.wait_for(|s| {
            s.messages
                .last()
                .is_some_and(|m| m.status == Some(ticketdesk_shared::MessageStatus::Read))
        }),
    )
    .await
    .unwrap()
    .unwrap();

    widget.close().await;
}
