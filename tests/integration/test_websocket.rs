//! WebSocket transport tests over a real TCP listener.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use dealcoach_engine::{
    MemoryStore, PersistedSession, Phase, RoleplayService, SessionStatus, SessionStore,
};
use dealcoach_llm::LlmClient;
use dealcoach_server::{create_router, AppState, CLOSE_CODE_REPLACED};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tungstenite::protocol::Message;
use uuid::Uuid;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn session(scenario_id: &str) -> PersistedSession {
    PersistedSession {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        scenario_id: scenario_id.to_string(),
        status: SessionStatus::Created,
        current_phase: Phase::Greeting,
        turn_count: 0,
        snapshot: None,
        evaluation_summary: None,
    }
}

/// Spawns the server on an ephemeral port with a long heartbeat so tests
/// only see the events they cause.
async fn spawn_server(sessions: Vec<PersistedSession>) -> std::net::SocketAddr {
    let store = Arc::new(MemoryStore::new());
    for s in sessions {
        store.insert_session(s);
    }
    let service = RoleplayService::new(
        Arc::new(LlmClient::mock()),
        store as Arc<dyn SessionStore>,
    );
    let state = AppState::new(
        Arc::new(service),
        Duration::from_secs(60),
        Duration::from_secs(300),
    );
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: std::net::SocketAddr, session_id: Uuid) -> WsStream {
    let (socket, _) = tokio_tungstenite::connect_async(format!(
        "ws://{addr}/ws/roleplay/{session_id}"
    ))
    .await
    .unwrap();
    socket
}

/// Reads the next JSON event, skipping heartbeats.
async fn next_event(socket: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed while waiting for an event")
            .unwrap();
        if let Message::Text(text) = frame {
            let event: Value = serde_json::from_str(&text).unwrap();
            if event["type"] != "heartbeat" {
                return event;
            }
        }
    }
}

async fn send_json(socket: &mut WsStream, event: Value) {
    socket.send(Message::Text(event.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_session_lifecycle_over_websocket() {
    let persisted = session("discovery_basics");
    let session_id = persisted.id;
    let addr = spawn_server(vec![persisted]).await;

    let mut socket = connect(addr, session_id).await;

    let started = next_event(&mut socket).await;
    assert_eq!(started["type"], "session_started");
    assert_eq!(started["session_id"], session_id.to_string());
    assert_eq!(started["phase"], "greeting");

    send_json(
        &mut socket,
        json!({
            "type": "message",
            "content": "Tell me about your current process, and walk me through a typical week.",
        }),
    )
    .await;

    let typing = next_event(&mut socket).await;
    assert_eq!(typing["type"], "typing");
    assert_eq!(typing["is_typing"], true);

    let reply = next_event(&mut socket).await;
    assert_eq!(reply["type"], "message");
    assert_eq!(reply["phase"], "discovery");
    assert_eq!(reply["turn_number"], 1);
    assert_eq!(reply["is_final"], false);
    assert!(!reply["content"].as_str().unwrap().is_empty());

    send_json(&mut socket, json!({"type": "ping"})).await;
    let pong = next_event(&mut socket).await;
    assert_eq!(pong["type"], "pong");

    send_json(&mut socket, json!({"type": "end_session"})).await;
    let ended = next_event(&mut socket).await;
    assert_eq!(ended["type"], "session_ended");
    assert_eq!(ended["evaluation_summary"]["total_turns"], 1);
    assert_eq!(ended["evaluation_summary"]["final_phase"], "discovery");
}

#[tokio::test]
async fn test_newer_connection_evicts_older_one() {
    let persisted = session("rapport_cold");
    let session_id = persisted.id;
    let addr = spawn_server(vec![persisted]).await;

    let mut first = connect(addr, session_id).await;
    let started = next_event(&mut first).await;
    assert_eq!(started["type"], "session_started");

    let mut second = connect(addr, session_id).await;
    let started = next_event(&mut second).await;
    assert_eq!(started["type"], "session_started");

    let close = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => {}
                other => unreachable!("expected a close frame, got {other:?}"),
            }
        }
    })
    .await
    .unwrap();

    let frame = close.unwrap();
    assert_eq!(u16::from(frame.code), CLOSE_CODE_REPLACED);
    assert_eq!(frame.reason, "replaced by a newer connection");
}

#[tokio::test]
async fn test_unknown_session_gets_error_and_close() {
    let addr = spawn_server(vec![]).await;
    let missing = Uuid::new_v4();

    let mut socket = connect(addr, missing).await;
    let event = next_event(&mut socket).await;
    assert_eq!(event["type"], "error");
    assert!(event["message"]
        .as_str()
        .unwrap()
        .contains(&missing.to_string()));

    // The server closes after the error event.
    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, Message::Close(_)));
}
