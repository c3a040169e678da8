use crate::error::Result;
use crate::model::{EventLogEntry, Role};
use crate::storage::SessionStore;

/// Append one immutable row to the event log.
pub async fn record_event(
    store: &impl SessionStore,
    session_id: &str,
    role: Role,
    message: &str,
) -> Result<()> {
    store
        .append_event(&EventLogEntry::new(session_id, role, message))
        .await?;
    tracing::debug!(session_id, %role, len = message.len(), "event recorded");
    Ok(())
}
