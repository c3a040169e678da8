use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{ParleyError, Result};
use crate::model::*;

use super::SessionStore;

/// SQLite-backed session store for local runs.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across connection tasks. All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode and enables foreign keys, then creates both
    /// tables if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ParleyError::Storage(format!("failed to create database directory: {e}"))
            })?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| ParleyError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ParleyError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| ParleyError::Storage(format!("failed to set WAL mode: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| ParleyError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        store.create_tables()?;
        Ok(store)
    }

    /// Create both tables and the event index (idempotent).
    ///
    /// `start_time` defaults to the insert time in UTC, mirroring the
    /// column default on the remote store.
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                start_time TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                end_time TEXT,
                duration_seconds INTEGER,
                summary TEXT
            );

            CREATE TABLE IF NOT EXISTS event_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(session_id),
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                message TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_event_logs_session_id ON event_logs(session_id);
            ",
        )
        .map_err(|e| ParleyError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                ParleyError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| ParleyError::Storage(format!("task join error: {e}")))?
    }
}

fn sql_err(context: &str) -> impl FnOnce(rusqlite::Error) -> ParleyError + '_ {
    move |e| ParleyError::Storage(format!("{context}: {e}"))
}

impl SessionStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(sql_err("ping failed"))
        })
        .await
    }

    async fn insert_session_if_absent(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO sessions (session_id) VALUES (?1)
                     ON CONFLICT(session_id) DO NOTHING",
                    params![session_id],
                )
                .map_err(sql_err("failed to insert session"))?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT session_id, start_time, end_time, duration_seconds, summary
                     FROM sessions WHERE session_id = ?1 LIMIT 1",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(sql_err("failed to read session"))?;

            let Some((session_id, start, end, duration_seconds, summary)) = row else {
                return Ok(None);
            };
            Ok(Some(Session {
                session_id,
                start_time: start.as_deref().map(parse_timestamp).transpose()?,
                end_time: end.as_deref().map(parse_timestamp).transpose()?,
                duration_seconds,
                summary,
            }))
        })
        .await
    }

    async fn close_session(&self, session_id: &str, close: &SessionClose) -> Result<bool> {
        let session_id = session_id.to_string();
        let end_time = format_timestamp(&close.end_time);
        let duration_seconds = close.duration_seconds;
        let summary = close.summary.clone();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE sessions
                     SET end_time = ?2, duration_seconds = ?3, summary = ?4
                     WHERE session_id = ?1 AND end_time IS NULL",
                    params![session_id, end_time, duration_seconds, summary],
                )
                .map_err(sql_err("failed to close session"))?;
            Ok(updated > 0)
        })
        .await
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO event_logs (session_id, role, message) VALUES (?1, ?2, ?3)",
                params![entry.session_id, entry.role.as_str(), entry.message],
            )
            .map_err(sql_err("failed to append event"))?;
            Ok(())
        })
        .await
    }

    async fn list_events(&self, session_id: &str) -> Result<Vec<EventLogEntry>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, role, message FROM event_logs
                     WHERE session_id = ?1 ORDER BY id",
                )
                .map_err(sql_err("failed to prepare event query"))?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(sql_err("failed to list events"))?;

            let mut events = Vec::new();
            for row in rows {
                let (session_id, role, message) = row.map_err(sql_err("failed to read event"))?;
                events.push(EventLogEntry {
                    session_id,
                    role: role.parse()?,
                    message,
                });
            }
            Ok(events)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn open_in_memory_creates_tables() {
        let store = SqliteStore::open_in_memory().expect("should open in-memory DB");
        assert_eq!(store.path().to_str().unwrap(), ":memory:");

        let conn = store.conn.lock().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"event_logs".to_string()));
    }

    #[test]
    fn create_tables_is_idempotent() {
        let store = SqliteStore::open_in_memory().expect("should open in-memory DB");
        store.create_tables().expect("idempotent create_tables");
    }

    #[tokio::test]
    async fn insert_stamps_start_time() {
        let store = SqliteStore::open_in_memory().unwrap();
        let before = Utc::now() - chrono::Duration::seconds(1);

        assert!(store.insert_session_if_absent("s1").await.unwrap());
        let session = store.get_session("s1").await.unwrap().unwrap();

        let start = session.start_time.expect("start_time defaulted");
        assert!(start >= before);
        assert!(session.end_time.is_none());
        assert!(session.summary.is_none());
    }

    #[tokio::test]
    async fn insert_twice_keeps_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.insert_session_if_absent("s1").await.unwrap());
        assert!(!store.insert_session_if_absent("s1").await.unwrap());

        let count: i64 = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sessions WHERE session_id = 's1'",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| ParleyError::Storage(e.to_string()))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn events_come_back_in_insert_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_session_if_absent("s1").await.unwrap();
        store.insert_session_if_absent("other").await.unwrap();

        store
            .append_event(&EventLogEntry::new("s1", Role::User, "hi"))
            .await
            .unwrap();
        store
            .append_event(&EventLogEntry::new("other", Role::User, "elsewhere"))
            .await
            .unwrap();
        store
            .append_event(&EventLogEntry::new("s1", Role::Assistant, "Received: hi"))
            .await
            .unwrap();

        let events = store.list_events("s1").await.unwrap();
        assert_eq!(
            events,
            vec![
                EventLogEntry::new("s1", Role::User, "hi"),
                EventLogEntry::new("s1", Role::Assistant, "Received: hi"),
            ]
        );
    }

    #[tokio::test]
    async fn event_for_unknown_session_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = store
            .append_event(&EventLogEntry::new("ghost", Role::User, "hi"))
            .await;
        assert!(matches!(result, Err(ParleyError::Storage(_))));
    }

    #[tokio::test]
    async fn close_only_applies_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_session_if_absent("s1").await.unwrap();

        let first = SessionClose {
            end_time: Utc::now(),
            duration_seconds: Some(3),
            summary: "Conversation had 2 messages.".to_string(),
        };
        assert!(store.close_session("s1", &first).await.unwrap());

        let second = SessionClose {
            summary: "No conversation.".to_string(),
            ..first.clone()
        };
        assert!(!store.close_session("s1", &second).await.unwrap());

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(
            session.summary.as_deref(),
            Some("Conversation had 2 messages.")
        );
        assert_eq!(session.duration_seconds, Some(3));
    }

    #[tokio::test]
    async fn ping_succeeds() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ping().await.unwrap();
    }

    #[test]
    fn open_file_based_db() {
        let dir = std::env::temp_dir().join(format!(
            "parley-test-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let db_path = dir.join("nested").join("parley.db");

        let store = SqliteStore::open(&db_path).expect("should open file DB");
        assert_eq!(store.path(), db_path);

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
