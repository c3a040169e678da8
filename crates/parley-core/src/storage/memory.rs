use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{ParleyError, Result};
use crate::model::*;

use super::SessionStore;

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, Session>,
    events: Vec<EventLogEntry>,
}

/// Process-local store. Nothing survives a restart; used for tests and
/// throwaway local runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session row as-is, bypassing the start-time default.
    /// Lets tests seed rows with a known or missing `start_time`.
    pub fn seed_session(&self, session: Session) -> Result<()> {
        self.lock()?
            .sessions
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    pub fn session_count(&self) -> Result<usize> {
        Ok(self.lock()?.sessions.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| ParleyError::Storage(format!("failed to acquire store lock: {e}")))
    }
}

impl SessionStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn insert_session_if_absent(&self, session_id: &str) -> Result<bool> {
        let mut tables = self.lock()?;
        if tables.sessions.contains_key(session_id) {
            return Ok(false);
        }
        tables.sessions.insert(
            session_id.to_string(),
            Session::new(session_id).with_start_time(Utc::now()),
        );
        Ok(true)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    async fn close_session(&self, session_id: &str, close: &SessionClose) -> Result<bool> {
        let mut tables = self.lock()?;
        match tables.sessions.get_mut(session_id) {
            Some(session) if !session.is_closed() => {
                session.apply_close(close);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<()> {
        self.lock()?.events.push(entry.clone());
        Ok(())
    }

    async fn list_events(&self, session_id: &str) -> Result<Vec<EventLogEntry>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}
