use crate::error::Result;
use crate::model::*;

/// Abstract session store. The remote PostgREST table API is the primary
/// implementation; SQLite and the in-memory map back local runs and tests.
pub trait SessionStore: Send + Sync {
    /// Cheap read used by health checks.
    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Sessions --

    /// Atomically create a session row unless one already exists.
    /// Returns `true` when a new row was inserted.
    fn insert_session_if_absent(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    fn get_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Session>>> + Send;

    /// Write completion fields to a session that is still open.
    /// Returns `false` when no open row matched.
    fn close_session(
        &self,
        session_id: &str,
        close: &SessionClose,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    // -- Event log --

    fn append_event(
        &self,
        entry: &EventLogEntry,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// All events for a session, in the order the store returns them.
    fn list_events(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<EventLogEntry>>> + Send;
}
