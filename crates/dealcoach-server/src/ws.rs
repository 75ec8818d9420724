//! The per-connection WebSocket loop.
//!
//! Each socket binds to exactly one session. A newer connection for the same
//! session evicts the older one with close code 4001. The loop multiplexes
//! four concerns over one `select!`: eviction, heartbeats, idle timeout, and
//! client traffic.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::events::{ClientEvent, ServerEvent};
use crate::AppState;

/// Close code sent to a connection evicted by a newer one for the same
/// session.
pub const CLOSE_CODE_REPLACED: u16 = 4001;

type WsSender = SplitSink<WebSocket, Message>;

/// Tracks which connection currently owns each session.
///
/// Registering a session hands back an eviction token; a later registration
/// for the same session fires the previous token.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Notify>>>>,
}

impl ConnectionManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a session for a new connection.
    ///
    /// The returned token fires when a newer connection claims the same
    /// session. Any previous holder is notified immediately.
    #[must_use]
    pub fn register(&self, session_id: Uuid) -> Arc<Notify> {
        let token = Arc::new(Notify::new());
        let previous = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, Arc::clone(&token));
        if let Some(previous) = previous {
            // notify_one leaves a permit even if the old loop is mid-await
            // elsewhere in its select.
            previous.notify_one();
        }
        token
    }

    /// Releases a claim, but only if `token` still owns the session.
    pub fn release(&self, session_id: Uuid, token: &Arc<Notify>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner
            .get(&session_id)
            .is_some_and(|current| Arc::ptr_eq(current, token))
        {
            inner.remove(&session_id);
        }
    }

    /// Number of sessions with a live connection.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Upgrades `GET /ws/roleplay/:session_id` to a WebSocket.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, session_id, socket))
}

async fn handle_socket(state: Arc<AppState>, session_id: Uuid, socket: WebSocket) {
    let replaced = state.connections.register(session_id);
    let (mut sender, mut receiver) = socket.split();

    match state.service.start_session(session_id).await {
        Ok(phase) => {
            if !send_event(&mut sender, &ServerEvent::SessionStarted { session_id, phase }).await {
                state.connections.release(session_id, &replaced);
                return;
            }
        }
        Err(err) => {
            tracing::warn!(%session_id, error = %err, "session start rejected");
            send_event(
                &mut sender,
                &ServerEvent::Error {
                    message: err.to_string(),
                },
            )
            .await;
            let _ = sender.send(Message::Close(None)).await;
            state.connections.release(session_id, &replaced);
            return;
        }
    }

    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    // The first tick completes immediately; consume it so the loop only
    // sees real intervals.
    heartbeat.tick().await;
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            () = replaced.notified() => {
                tracing::info!(%session_id, "connection replaced by a newer one");
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_CODE_REPLACED,
                        reason: Cow::Borrowed("replaced by a newer connection"),
                    })))
                    .await;
                break;
            }
            _ = heartbeat.tick() => {
                if !send_event(&mut sender, &ServerEvent::Heartbeat).await {
                    break;
                }
            }
            () = tokio::time::sleep_until(last_activity + state.idle_timeout) => {
                tracing::info!(%session_id, "connection idle, closing");
                send_event(
                    &mut sender,
                    &ServerEvent::Error {
                        message: "session timed out".to_string(),
                    },
                )
                .await;
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        if !handle_client_event(&state, session_id, &mut sender, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_activity = Instant::now();
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(%session_id, "client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(%session_id, error = %err, "websocket receive failed");
                        break;
                    }
                }
            }
        }
    }

    state.connections.release(session_id, &replaced);
}

/// Handles one parsed client frame. Returns `false` when the connection
/// should close.
async fn handle_client_event(
    state: &AppState,
    session_id: Uuid,
    sender: &mut WsSender,
    text: &str,
) -> bool {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(%session_id, error = %err, "ignoring unparseable client frame");
            return true;
        }
    };

    match event {
        ClientEvent::Ping => send_event(sender, &ServerEvent::Pong).await,
        ClientEvent::EndSession => {
            finish_session(state, session_id, sender).await;
            false
        }
        ClientEvent::Message { content } => {
            if content.trim().is_empty() {
                return true;
            }
            if !send_event(sender, &ServerEvent::Typing { is_typing: true }).await {
                return false;
            }
            match state.service.process_message(session_id, &content).await {
                Ok(outcome) => {
                    let is_final = outcome.is_final;
                    let sent = send_event(
                        sender,
                        &ServerEvent::Message {
                            content: outcome.reply,
                            phase: outcome.phase,
                            turn_number: outcome.turn_number,
                            is_final,
                        },
                    )
                    .await;
                    if !sent {
                        return false;
                    }
                    if is_final {
                        finish_session(state, session_id, sender).await;
                        return false;
                    }
                    true
                }
                Err(err) => {
                    tracing::warn!(%session_id, error = %err, "turn failed");
                    send_event(
                        sender,
                        &ServerEvent::Error {
                            message: err.to_string(),
                        },
                    )
                    .await;
                    false
                }
            }
        }
    }
}

/// Ends the session and reports the summary (or the failure) to the client.
async fn finish_session(state: &AppState, session_id: Uuid, sender: &mut WsSender) {
    match state.service.end_session(session_id).await {
        Ok(summary) => {
            send_event(
                sender,
                &ServerEvent::SessionEnded {
                    evaluation_summary: summary,
                },
            )
            .await;
        }
        Err(err) => {
            tracing::warn!(%session_id, error = %err, "session teardown failed");
            send_event(
                sender,
                &ServerEvent::Error {
                    message: err.to_string(),
                },
            )
            .await;
        }
    }
}

/// Serializes and sends one event; returns `false` when the socket is gone.
async fn send_event(sender: &mut WsSender, event: &ServerEvent) -> bool {
    let Ok(json) = serde_json::to_string(event) else {
        return false;
    };
    sender.send(Message::Text(json)).await.is_ok()
}
