use crate::error::Result;
use crate::storage::SessionStore;

/// Make sure a session row exists for `session_id`.
///
/// Delegates to the store's atomic insert-if-absent, so concurrent callers
/// cannot produce duplicate rows. Returns `true` when this call created it.
pub async fn ensure_session(store: &impl SessionStore, session_id: &str) -> Result<bool> {
    let created = store.insert_session_if_absent(session_id).await?;
    if created {
        tracing::info!(session_id, "session created");
    } else {
        tracing::debug!(session_id, "session already exists");
    }
    Ok(created)
}
