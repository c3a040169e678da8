use crate::error::{ParleyError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Custom path for the SQLite database. Defaults to `<data_dir>/parley/parley.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

/// Remote PostgREST endpoint (e.g. a Supabase project).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Project base URL; `/rest/v1` is appended. Falls back to `$SUPABASE_URL`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the access key when `api_key` is unset.
    #[serde(default)]
    pub env_var: Option<String>,
    /// Postgres schema, sent as `Accept-Profile`/`Content-Profile`.
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            env_var: None,
            schema: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
        }
    }
}

/// Valid storage backend names.
pub const VALID_STORAGE_BACKENDS: &[&str] = &["postgrest", "sqlite", "memory"];

/// Environment variable read for the remote store URL when `remote.url` is unset.
pub const DEFAULT_URL_ENV: &str = "SUPABASE_URL";

/// Environment variable read for the remote access key when `remote.api_key` is unset.
pub const DEFAULT_API_KEY_ENV: &str = "SUPABASE_KEY";

// -- Defaults --

fn default_storage_backend() -> String {
    "postgrest".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_web_port() -> u16 {
    8000
}
fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

impl ParleyConfig {
    /// Load configuration with layered merge:
    /// 1. ~/.config/parley/config.toml (global)
    /// 2. .parley/config.toml (project)
    /// 3. .parley/config.local.toml (local, gitignored)
    /// 4. `PARLEY_*` environment variables (`PARLEY_WEB__PORT=9000`)
    ///
    /// `SUPABASE_URL` fills `remote.url` when no layer set it.
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Layer 1: Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // Layer 2: Project config
        if let Some(dir) = project_dir {
            let project_config = dir.join(".parley").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            // Layer 3: Local config (gitignored)
            let local_config = dir.join(".parley").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        // Layer 4: Environment
        builder = builder.add_source(
            Environment::with_prefix("PARLEY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ParleyError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| ParleyError::Config(e.to_string()))?;

        cfg.apply_env_fallbacks(|name| std::env::var(name).ok());
        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files, no environment).
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            web: WebConfig::default(),
        }
    }

    /// Fill unset remote fields from conventional environment variables.
    pub fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let unset = self.remote.url.as_deref().map_or(true, str::is_empty);
        if unset {
            if let Some(url) = lookup(DEFAULT_URL_ENV).filter(|u| !u.is_empty()) {
                self.remote.url = Some(url);
            }
        }
    }

    /// Validate config values, fixing out-of-range values and logging warnings.
    /// Lenient: fixes values instead of rejecting the config.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            warnings.push(format!(
                "unknown storage backend '{}', valid: {}",
                self.storage.backend,
                VALID_STORAGE_BACKENDS.join(", ")
            ));
        }

        if self.storage.backend == "postgrest" && self.remote.url.is_none() {
            warnings.push(format!(
                "storage.backend = postgrest but remote.url is unset (set it or {DEFAULT_URL_ENV})"
            ));
        }

        if self.remote.timeout_secs == 0 {
            warnings.push("remote.timeout_secs = 0, setting to 30".to_string());
            self.remote.timeout_secs = default_timeout_secs();
        }
        if self.remote.connect_timeout_secs == 0 {
            warnings.push("remote.connect_timeout_secs = 0, setting to 5".to_string());
            self.remote.connect_timeout_secs = default_connect_timeout_secs();
        }

        if self.web.host.trim().is_empty() {
            warnings.push("web.host is empty, using 0.0.0.0".to_string());
            self.web.host = default_web_host();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

/// Read a `.env` file into the process environment without overriding
/// variables that are already set. `<project_dir>/.env` wins; otherwise the
/// working directory and its parents are searched. Returns the file read.
pub fn load_env_file(project_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = project_dir {
        let path = dir.join(".env");
        if path.is_file() {
            return match dotenvy::from_path(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::warn!("failed to read {}: {e}", path.display());
                    None
                }
            };
        }
    }
    dotenvy::dotenv().ok()
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("config.toml"))
}

/// Resolve the remote access key: check the config field first, then the
/// environment variable (the override name if given, else the default).
pub fn resolve_api_key(
    api_key: Option<&str>,
    env_var_override: Option<&str>,
    default_env_var: &str,
) -> Result<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    let env_var_name = env_var_override.unwrap_or(default_env_var);

    std::env::var(env_var_name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ParleyError::Config(format!(
                "remote store requires an access key (set remote.api_key or {env_var_name})"
            ))
        })
}
