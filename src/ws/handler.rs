//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::room::{Frame, RoomError};
use crate::session::SessionId;
use crate::util::rate_limit::InputRateLimiter;
use crate::ws::protocol::{decode_client_msg, ClientMsg, ServerMsg};

const OUTBOUND_BUFFER: usize = 256;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session to re-attach to, if the client has one
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.session_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, presented: Option<String>, state: AppState) {
    let session = state.sessions.resolve(presented.as_deref());
    info!(session_id = %session, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    // Writer task: direct replies and room frames -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = ws_sink.send(msg).await {
                debug!(session_id = %session, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let mut conn = Connection::new(session, state.clone(), out_tx);
    conn.reply(&ServerMsg::Session {
        session_id: session,
    })
    .await;

    let rate_limiter = InputRateLimiter::new(state.config.input_rate_limit);

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(session_id = %session, "Rate limited client message");
                    continue;
                }
                match decode_client_msg(&text) {
                    Ok(msg) => conn.handle(msg).await,
                    Err(e) => {
                        warn!(session_id = %session, error = %e, "Dropping client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session, error = %e, "WebSocket error");
                break;
            }
        }
    }

    conn.close().await;
    writer_handle.abort();

    info!(session_id = %session, "WebSocket connection closed");
}

/// Per-connection state between the socket and the room
struct Connection {
    session: SessionId,
    state: AppState,
    out_tx: mpsc::Sender<Message>,
    /// Forwards room frames while this connection's session is in the room
    feed: Option<JoinHandle<()>>,
}

impl Connection {
    fn new(session: SessionId, state: AppState, out_tx: mpsc::Sender<Message>) -> Self {
        Self {
            session,
            state,
            out_tx,
            feed: None,
        }
    }

    async fn handle(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::Join { username } => self.join(username).await,
            ClientMsg::Leave { session_id } => {
                let Some(target) = self.target(session_id.as_deref()) else {
                    return;
                };
                if target == self.session {
                    self.stop_feed();
                }
                if self.state.room.leave(target).await.is_err() {
                    warn!(session_id = %target, "Room unavailable for leave");
                }
            }
            ClientMsg::StartGame => {
                if let Err(e) = self.state.room.start_round().await {
                    self.reply(&ServerMsg::StartGameError {
                        text: e.to_string(),
                    })
                    .await;
                }
            }
            ClientMsg::StopGame => {
                if self.state.room.stop_round().await.is_err() {
                    warn!(session_id = %self.session, "Room unavailable for stop");
                }
            }
            ClientMsg::Input { session_id, keys } => {
                if let Some(target) = self.target(session_id.as_deref()) {
                    self.state.sessions.record_input(target, keys);
                }
            }
        }
    }

    async fn join(&mut self, username: String) {
        // Subscribe first so the roster update for this join is delivered
        let rx = self.state.room.subscribe();
        match self.state.room.join(self.session, username).await {
            Ok(text) => {
                if self.feed.is_none() {
                    self.feed = Some(spawn_feed(self.session, rx, self.out_tx.clone()));
                }
                self.reply(&ServerMsg::RoomJoined { text }).await;
            }
            Err(RoomError::EmptyUsername) => {
                self.reply(&ServerMsg::UsernameError {
                    text: RoomError::EmptyUsername.to_string(),
                })
                .await;
            }
            Err(e) => {
                warn!(session_id = %self.session, error = %e, "Join failed");
            }
        }
    }

    /// Session a message refers to. Absent means this connection's own;
    /// malformed or unknown ids resolve to nothing.
    fn target(&self, presented: Option<&str>) -> Option<SessionId> {
        let Some(raw) = presented else {
            return Some(self.session);
        };
        let id = SessionId::parse(raw);
        if id.is_none() {
            debug!(session_id = %self.session, presented = raw, "Message for unknown session ignored");
        }
        id
    }

    async fn reply(&self, msg: &ServerMsg) {
        match Frame::encode(msg) {
            Ok(frame) => {
                let _ = self.out_tx.send(Message::Text(frame.to_string())).await;
            }
            Err(e) => error!(error = %e, "Failed to encode reply"),
        }
    }

    fn stop_feed(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
    }

    /// Transport is gone: drop roster membership, never the round. Sessions
    /// still held by a newer connection stay in the room.
    async fn close(mut self) {
        self.stop_feed();
        if !self.state.sessions.release(self.session) {
            debug!(session_id = %self.session, "Session still attached elsewhere");
            return;
        }
        if self.state.room.disconnect(self.session).await.is_err() {
            debug!(session_id = %self.session, "Room unavailable during disconnect");
        }
    }
}

/// Forward room frames to one connection until it leaves or goes away
fn spawn_feed(
    session: SessionId,
    mut rx: broadcast::Receiver<Frame>,
    out_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if out_tx.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(session_id = %session, lagged_count = n, "Client lagged, skipping frames");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %session, "Room feed closed");
                    break;
                }
            }
        }
    })
}
