mod backend;
mod memory;
mod postgrest;
mod sqlite;

pub use backend::SessionStore;
pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use crate::model::*;

/// Enum wrapper for store backends. Dispatches to the concrete implementation.
/// Using an enum instead of `Box<dyn SessionStore>` because the trait uses RPITIT.
pub enum Store {
    Postgrest(PostgrestStore),
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl SessionStore for Store {
    async fn ping(&self) -> Result<()> {
        match self {
            Store::Postgrest(s) => s.ping().await,
            Store::Sqlite(s) => s.ping().await,
            Store::Memory(s) => s.ping().await,
        }
    }

    async fn insert_session_if_absent(&self, session_id: &str) -> Result<bool> {
        match self {
            Store::Postgrest(s) => s.insert_session_if_absent(session_id).await,
            Store::Sqlite(s) => s.insert_session_if_absent(session_id).await,
            Store::Memory(s) => s.insert_session_if_absent(session_id).await,
        }
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        match self {
            Store::Postgrest(s) => s.get_session(session_id).await,
            Store::Sqlite(s) => s.get_session(session_id).await,
            Store::Memory(s) => s.get_session(session_id).await,
        }
    }

    async fn close_session(&self, session_id: &str, close: &SessionClose) -> Result<bool> {
        match self {
            Store::Postgrest(s) => s.close_session(session_id, close).await,
            Store::Sqlite(s) => s.close_session(session_id, close).await,
            Store::Memory(s) => s.close_session(session_id, close).await,
        }
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<()> {
        match self {
            Store::Postgrest(s) => s.append_event(entry).await,
            Store::Sqlite(s) => s.append_event(entry).await,
            Store::Memory(s) => s.append_event(entry).await,
        }
    }

    async fn list_events(&self, session_id: &str) -> Result<Vec<EventLogEntry>> {
        match self {
            Store::Postgrest(s) => s.list_events(session_id).await,
            Store::Sqlite(s) => s.list_events(session_id).await,
            Store::Memory(s) => s.list_events(session_id).await,
        }
    }
}

impl Store {
    /// Backend name as it appears in `storage.backend`.
    pub fn kind(&self) -> &'static str {
        match self {
            Store::Postgrest(_) => "postgrest",
            Store::Sqlite(_) => "sqlite",
            Store::Memory(_) => "memory",
        }
    }
}

/// Create a store backend from the given configuration.
pub fn create_backend(config: &ParleyConfig) -> Result<Store> {
    match config.storage.backend.as_str() {
        "postgrest" => Ok(Store::Postgrest(PostgrestStore::from_config(&config.remote)?)),
        "sqlite" => {
            let path = match &config.storage.path {
                Some(p) => std::path::PathBuf::from(p),
                None => default_sqlite_path()?,
            };
            Ok(Store::Sqlite(SqliteStore::open(&path)?))
        }
        "memory" => Ok(Store::Memory(MemoryStore::new())),
        other => Err(ParleyError::Config(format!(
            "unknown storage backend '{other}', valid: {}",
            crate::config::VALID_STORAGE_BACKENDS.join(", ")
        ))),
    }
}

fn default_sqlite_path() -> Result<std::path::PathBuf> {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .ok_or_else(|| ParleyError::Config("cannot determine data directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_memory_backend() {
        let mut config = ParleyConfig::default_config();
        config.storage.backend = "memory".to_string();
        let store = create_backend(&config).unwrap();
        assert_eq!(store.kind(), "memory");
    }

    #[test]
    fn create_sqlite_backend_at_custom_path() {
        let dir = std::env::temp_dir().join(format!("parley-backend-{}", std::process::id()));
        let mut config = ParleyConfig::default_config();
        config.storage.backend = "sqlite".to_string();
        config.storage.path = Some(dir.join("custom.db").to_string_lossy().into_owned());

        let store = create_backend(&config).unwrap();
        assert_eq!(store.kind(), "sqlite");

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn create_postgrest_backend_without_url_fails() {
        let mut config = ParleyConfig::default_config();
        config.storage.backend = "postgrest".to_string();
        config.remote.url = None;
        config.remote.api_key = Some("key".to_string());
        let err = create_backend(&config).err().unwrap();
        assert!(matches!(err, ParleyError::Config(_)));
    }

    #[test]
    fn create_postgrest_backend_from_config() {
        let mut config = ParleyConfig::default_config();
        config.storage.backend = "postgrest".to_string();
        config.remote.url = Some("https://project.supabase.co".to_string());
        config.remote.api_key = Some("key".to_string());
        let store = create_backend(&config).unwrap();
        assert_eq!(store.kind(), "postgrest");
    }

    #[test]
    fn unknown_backend_is_config_error() {
        let mut config = ParleyConfig::default_config();
        config.storage.backend = "mongodb".to_string();
        let err = create_backend(&config).err().unwrap();
        assert!(err.to_string().contains("unknown storage backend"));
    }

    #[tokio::test]
    async fn enum_dispatches_to_inner_store() {
        let store = Store::Memory(MemoryStore::new());
        assert!(store.insert_session_if_absent("s1").await.unwrap());
        store
            .append_event(&EventLogEntry::new("s1", Role::User, "hi"))
            .await
            .unwrap();
        assert_eq!(store.list_events("s1").await.unwrap().len(), 1);
        assert!(store.get_session("s1").await.unwrap().is_some());
    }
}
