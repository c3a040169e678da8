use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ParleyError {
    /// Returns `true` when the error came from the remote store or its transport,
    /// as opposed to local configuration or input problems.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Http(_) | Self::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_is_store_error() {
        let err = ParleyError::Storage("sessions returned 500".into());
        assert!(err.is_store_error());
    }

    #[test]
    fn test_config_is_not_store_error() {
        let err = ParleyError::Config("missing remote.url".into());
        assert!(!err.is_store_error());
    }

    #[test]
    fn test_transport_is_not_store_error() {
        let err = ParleyError::Transport("socket closed".into());
        assert!(!err.is_store_error());
    }

    #[test]
    fn test_display_includes_category() {
        let err = ParleyError::InvalidInput("unknown role: system".into());
        assert_eq!(err.to_string(), "Invalid input: unknown role: system");
    }
}
