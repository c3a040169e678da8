//! Per-connection session lifecycle, independent of the wire transport.
//!
//! A connection moves Connecting → Open → Closed. The transport hands the
//! relay a stream of [`Inbound`] values; the stream's terminal value (clean
//! close, transport error, or simply ending) drives finalization.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures_util::{Stream, StreamExt};

use crate::error::Result;
use crate::event_log::record_event;
use crate::finalize::finalize;
use crate::model::{Role, SessionClose};
use crate::registry::ensure_session;
use crate::responder::Responder;
use crate::storage::SessionStore;

/// One item read from the client side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The client closed the stream cleanly.
    Closed,
    /// The transport failed; treated as a disconnect.
    Error(String),
}

/// How the client side of the connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    Clean,
    TransportError(String),
}

/// Write half of a connection.
pub trait Outbound: Send {
    fn send_text(&mut self, text: String)
        -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Result of a connection that reached the Closed state.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub session_id: String,
    pub messages_relayed: usize,
    pub disconnect: Disconnect,
    pub close: SessionClose,
}

/// Drives one connection: registers the session, logs and answers each
/// message in order, and finalizes once the inbound stream ends.
pub struct SessionRelay<'a, S, R: ?Sized> {
    store: &'a S,
    responder: &'a R,
}

impl<'a, S, R> SessionRelay<'a, S, R>
where
    S: SessionStore,
    R: Responder + ?Sized,
{
    pub fn new(store: &'a S, responder: &'a R) -> Self {
        Self { store, responder }
    }

    /// Run the connection to completion.
    ///
    /// A store error while open returns early without finalizing; the session
    /// row is left open. A failed send counts as a transport disconnect.
    pub async fn run<I, O>(
        &self,
        session_id: &str,
        mut inbound: I,
        outbound: &mut O,
    ) -> Result<RelayOutcome>
    where
        I: Stream<Item = Inbound> + Unpin + Send,
        O: Outbound,
    {
        ensure_session(self.store, session_id).await?;
        tracing::info!(session_id, "client connected");

        let mut messages_relayed = 0usize;
        let disconnect = loop {
            let text = match inbound.next().await {
                Some(Inbound::Text(text)) => text,
                Some(Inbound::Closed) | None => break Disconnect::Clean,
                Some(Inbound::Error(reason)) => break Disconnect::TransportError(reason),
            };

            record_event(self.store, session_id, Role::User, &text).await?;
            let reply = self.responder.respond(&text);
            record_event(self.store, session_id, Role::Assistant, &reply).await?;

            if let Err(e) = outbound.send_text(reply).await {
                break Disconnect::TransportError(e.to_string());
            }
            messages_relayed += 1;
        };

        match &disconnect {
            Disconnect::Clean => tracing::info!(session_id, "client disconnected"),
            Disconnect::TransportError(reason) => {
                tracing::warn!(session_id, %reason, "client connection lost")
            }
        }

        let close = finalize(self.store, session_id, Utc::now()).await?;
        Ok(RelayOutcome {
            session_id: session_id.to_string(),
            messages_relayed,
            disconnect,
            close,
        })
    }
}

/// Session ids with a live connection in this process.
///
/// A second connection for an id that is already live is refused; the
/// claim is released when its [`SessionClaim`] drops.
#[derive(Debug, Clone, Default)]
pub struct ActiveSessions {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id`, or `None` if another connection holds it.
    pub fn claim(&self, session_id: &str) -> Option<SessionClaim> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(session_id.to_string()) {
            return None;
        }
        Some(SessionClaim {
            session_id: session_id.to_string(),
            ids: Arc::clone(&self.ids),
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on a session id for the lifetime of one connection.
#[derive(Debug)]
pub struct SessionClaim {
    session_id: String,
    ids: Arc<Mutex<HashSet<String>>>,
}

impl SessionClaim {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.remove(&self.session_id);
    }
}
