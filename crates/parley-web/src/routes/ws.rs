//! `/ws/session/{session_id}`: one WebSocket per chat session.
//!
//! Each text frame is logged, answered by the configured responder, and the
//! reply logged and sent back. When the client goes away the session row is
//! finalized. A second connection for an id that is already live is closed
//! immediately with a policy-violation frame.

use std::future;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_core::error::{ParleyError, Result};
use parley_core::relay::{Inbound, Outbound, SessionRelay};

use crate::AppState;

pub const DUPLICATE_SESSION_REASON: &str = "session already active";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws/session/{session_id}", get(ws_session))
}

async fn ws_session(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(mut socket: WebSocket, session_id: String, state: Arc<AppState>) {
    let Some(_claim) = state.active.claim(&session_id) else {
        tracing::warn!(session_id, "rejecting second connection for live session");
        let frame = CloseFrame {
            code: close_code::POLICY,
            reason: DUPLICATE_SESSION_REASON.into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        return;
    };

    let (sink, stream) = socket.split();
    let inbound = stream.filter_map(|msg| future::ready(to_inbound(msg)));
    let mut outbound = WsOutbound(sink);

    let relay = SessionRelay::new(&state.store, state.responder.as_ref());
    match relay.run(&session_id, inbound, &mut outbound).await {
        Ok(outcome) => {
            tracing::debug!(
                session_id,
                messages = outcome.messages_relayed,
                "connection closed"
            );
            // Already closed when the client initiated it.
            let _ = outbound.0.close().await;
        }
        Err(e) if e.is_store_error() => {
            tracing::error!(session_id, "store failure, session left open: {e}");
        }
        Err(e) => {
            tracing::error!(session_id, "connection aborted: {e}");
        }
    }
}

/// Map a raw frame onto the relay's view. Binary and ping/pong frames carry
/// no chat content and are skipped.
fn to_inbound(msg: std::result::Result<Message, axum::Error>) -> Option<Inbound> {
    match msg {
        Ok(Message::Text(text)) => Some(Inbound::Text(text.to_string())),
        Ok(Message::Close(_)) => Some(Inbound::Closed),
        Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => None,
        Err(e) => Some(Inbound::Error(e.to_string())),
    }
}

struct WsOutbound(SplitSink<WebSocket, Message>);

impl Outbound for WsOutbound {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))
    }
}
