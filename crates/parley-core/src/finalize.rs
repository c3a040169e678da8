//! Post-disconnect close-out of a session row.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::SessionClose;
use crate::storage::SessionStore;

/// Placeholder summary: counts the logged messages.
pub fn generate_summary<S: AsRef<str>>(messages: &[S]) -> String {
    if messages.is_empty() {
        "No conversation.".to_string()
    } else {
        format!("Conversation had {} messages.", messages.len())
    }
}

/// Whole seconds between `start` and `end`, truncated toward zero and never
/// negative. `None` when the session has no recorded start.
pub fn compute_duration(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Option<i64> {
    start.map(|start| (end - start).num_seconds().max(0))
}

/// The end time to record. `start_time` is stamped by the store's clock and
/// `now` by ours; when they disagree the end is pinned to the start.
pub fn close_time(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    start.map_or(now, |start| now.max(start))
}

/// Summarize the session's log and write its completion fields.
///
/// Reads the session's `start_time` (absent row or column yields no
/// duration), collects every logged message, and updates the row only if it
/// is still open. Store errors propagate unchanged.
pub async fn finalize(
    store: &impl SessionStore,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<SessionClose> {
    let start_time = store
        .get_session(session_id)
        .await?
        .and_then(|s| s.start_time);

    let messages: Vec<String> = store
        .list_events(session_id)
        .await?
        .into_iter()
        .map(|e| e.message)
        .collect();

    let end_time = close_time(start_time, now);
    if end_time != now {
        tracing::warn!(session_id, "store clock ahead of relay clock, clamping end_time");
    }
    let close = SessionClose {
        end_time,
        duration_seconds: compute_duration(start_time, end_time),
        summary: generate_summary(&messages),
    };

    if store.close_session(session_id, &close).await? {
        tracing::info!(
            session_id,
            messages = messages.len(),
            duration_seconds = close.duration_seconds,
            "session finalized"
        );
    } else {
        tracing::warn!(session_id, "no open session row to finalize");
    }

    Ok(close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::record_event;
    use crate::model::{Role, Session};
    use crate::registry::ensure_session;
    use crate::storage::{MemoryStore, SqliteStore};
    use chrono::TimeZone;

    #[test]
    fn summary_of_nothing() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(generate_summary(&empty), "No conversation.");
    }

    #[test]
    fn summary_counts_regardless_of_content() {
        assert_eq!(generate_summary(&["x"]), "Conversation had 1 messages.");
        assert_eq!(
            generate_summary(&["", "", "", ""]),
            "Conversation had 4 messages."
        );
        let many: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(generate_summary(&many), "Conversation had 25 messages.");
    }

    #[test]
    fn duration_truncates_fractional_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(2_999);
        assert_eq!(compute_duration(Some(start), end), Some(2));
        assert_eq!(compute_duration(Some(start), start), Some(0));
    }

    #[test]
    fn duration_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 3).unwrap();
        let end = start - chrono::Duration::seconds(3);
        assert_eq!(compute_duration(Some(start), end), Some(0));
    }

    #[test]
    fn close_time_pinned_to_start_when_clock_behind() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 3).unwrap();
        let behind = start - chrono::Duration::seconds(3);
        assert_eq!(close_time(Some(start), behind), start);
        let ahead = start + chrono::Duration::seconds(3);
        assert_eq!(close_time(Some(start), ahead), ahead);
        assert_eq!(close_time(None, behind), behind);
    }

    #[tokio::test]
    async fn finalize_with_store_clock_ahead_keeps_end_after_start() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let start = now + chrono::Duration::seconds(3);
        store
            .seed_session(Session::new("s").with_start_time(start))
            .unwrap();

        let close = finalize(&store, "s", now).await.unwrap();
        assert_eq!(close.duration_seconds, Some(0));
        assert_eq!(close.end_time, start);

        let session = store.get_session("s").await.unwrap().unwrap();
        assert!(session.end_time >= session.start_time);
        assert_eq!(session.duration_seconds, Some(0));
    }

    #[test]
    fn duration_without_start_is_none() {
        assert_eq!(compute_duration(None, Utc::now()), None);
    }

    #[tokio::test]
    async fn finalize_writes_summary_and_duration() {
        let store = MemoryStore::new();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store
            .seed_session(Session::new("s1").with_start_time(start))
            .unwrap();
        record_event(&store, "s1", Role::User, "hi").await.unwrap();
        record_event(&store, "s1", Role::Assistant, "Received: hi")
            .await
            .unwrap();

        let now = start + chrono::Duration::seconds(90);
        let close = finalize(&store, "s1", now).await.unwrap();
        assert_eq!(close.summary, "Conversation had 2 messages.");
        assert_eq!(close.duration_seconds, Some(90));

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.end_time, Some(now));
        assert!(session.end_time >= session.start_time);
        assert_eq!(session.duration_seconds, Some(90));
        assert_eq!(
            session.summary.as_deref(),
            Some("Conversation had 2 messages.")
        );
    }

    #[tokio::test]
    async fn finalize_missing_start_time_reports_no_duration() {
        let store = MemoryStore::new();
        store.seed_session(Session::new("s1")).unwrap();

        let close = finalize(&store, "s1", Utc::now()).await.unwrap();
        assert_eq!(close.duration_seconds, None);
        assert_eq!(close.summary, "No conversation.");

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert!(session.end_time.is_some());
        assert_eq!(session.duration_seconds, None);
    }

    #[tokio::test]
    async fn finalize_missing_row_still_computes_close() {
        let store = MemoryStore::new();
        let close = finalize(&store, "ghost", Utc::now()).await.unwrap();
        assert_eq!(close.duration_seconds, None);
        assert_eq!(close.summary, "No conversation.");
        assert!(store.get_session("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finalize_does_not_reopen_closed_session() {
        let store = SqliteStore::open_in_memory().unwrap();
        ensure_session(&store, "s1").await.unwrap();
        record_event(&store, "s1", Role::User, "hi").await.unwrap();

        let first_end = Utc::now();
        finalize(&store, "s1", first_end).await.unwrap();

        record_event(&store, "s1", Role::User, "again").await.unwrap();
        finalize(&store, "s1", first_end + chrono::Duration::seconds(60))
            .await
            .unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(
            session.summary.as_deref(),
            Some("Conversation had 1 messages.")
        );
    }

    #[tokio::test]
    async fn finalize_against_sqlite_uses_store_start_time() {
        let store = SqliteStore::open_in_memory().unwrap();
        ensure_session(&store, "s2").await.unwrap();

        let close = finalize(&store, "s2", Utc::now()).await.unwrap();
        assert_eq!(close.summary, "No conversation.");
        let duration = close.duration_seconds.expect("start_time was stamped");
        assert!((0..=1).contains(&duration), "duration = {duration}");
    }
}
