//! Configuration for the devbot service.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a working local setup: Ollama on localhost, in-memory stores.
//!
//! A model API key kept in the file makes the loader strict about file
//! permissions; `DEVBOT_LLM_API_KEY` avoids that entirely.

use std::path::{Path, PathBuf};

use anyhow::Context;
use devbot_llm::LlmConfig;
use devbot_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable holding the Postgres URL when none is configured.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Main devbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevbotConfig {
    /// Language-model provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Semantic store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Chat history backend
    #[serde(default)]
    pub history: HistoryConfig,

    /// Retrieval, memory and chunking settings
    #[serde(default)]
    pub retrieval: MemoryConfig,

    /// Ingestion inputs
    #[serde(default)]
    pub ingest: IngestConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where data is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process memory; lost on exit
    #[default]
    Memory,
    /// PostgreSQL via `database_url` or `DATABASE_URL`
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Rows returned by a history listing when no limit is given
    #[serde(default = "default_history_limit")]
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Markdown file indexed by `index-tutorial`
    #[serde(default = "default_tutorial_path")]
    pub tutorial_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_history_limit() -> usize {
    20
}

fn default_tutorial_path() -> PathBuf {
    PathBuf::from("tutorials/python_tutorial.md")
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            default_limit: default_history_limit(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tutorial_path: default_tutorial_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Configured URL, else `DATABASE_URL`.
pub fn resolve_database_url(configured: Option<&str>) -> Option<String> {
    configured
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(DATABASE_URL_ENV).ok().filter(|u| !u.is_empty()))
}

impl StoreConfig {
    pub fn resolve_database_url(&self) -> Option<String> {
        resolve_database_url(self.database_url.as_deref())
    }
}

impl HistoryConfig {
    pub fn resolve_database_url(&self) -> Option<String> {
        resolve_database_url(self.database_url.as_deref())
    }
}

impl DevbotConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix a world-writable file is refused, and so is a world-readable
    /// one that sets `llm.api_key`.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = Self::from_file_unchecked(path)?;
        let holds_key = config.llm.api_key.is_some();

        #[cfg(unix)]
        check_file_mode(path, holds_key)?;

        if holds_key {
            warn!(
                path = %path.display(),
                "llm.api_key is set in the config file; prefer {}",
                devbot_llm::config::API_KEY_ENV
            );
        }

        Ok(config)
    }

    /// Parse a TOML file without looking at its permissions.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(unix)]
fn check_file_mode(path: &Path, holds_key: bool) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .permissions()
        .mode()
        & 0o777;

    if mode & 0o002 != 0 {
        anyhow::bail!(
            "config {} is world-writable (mode {mode:04o}); run chmod o-w",
            path.display()
        );
    }
    if holds_key && mode & 0o004 != 0 {
        anyhow::bail!(
            "config {} sets llm.api_key but is world-readable (mode {mode:04o}); run chmod 600",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbot_memory::EmbeddingProvider;
    use std::io::Write;

    const FULL: &str = r#"
[llm]
provider = "ollama"
model = "codellama:7b"
api_url = "http://gpu-box:11434"

[store]
backend = "postgres"
database_url = "postgres://devbot@localhost/devbot"

[history]
backend = "memory"
default_limit = 50

[retrieval]
top_k = 3
embedding_provider = "hashing"

[ingest]
tutorial_path = "docs/tutorial.md"

[server]
bind = "0.0.0.0"
port = 9000
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: DevbotConfig = toml::from_str("").unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model, "deepseek-coder:6.7b");
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.history.default_limit, 20);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert_eq!(config.retrieval.chunk_overlap, 100);
        assert_eq!(config.server.port, 8000);
        assert_eq!(
            config.ingest.tutorial_path,
            PathBuf::from("tutorials/python_tutorial.md")
        );
    }

    #[test]
    fn full_config_parses() {
        let config: DevbotConfig = toml::from_str(FULL).unwrap();
        assert_eq!(config.llm.model, "codellama:7b");
        assert_eq!(config.store.backend, Backend::Postgres);
        assert_eq!(
            config.store.resolve_database_url().as_deref(),
            Some("postgres://devbot@localhost/devbot")
        );
        assert_eq!(config.history.default_limit, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(config.retrieval.memory_collection, "memory");
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn from_file_reads_toml() {
        let file = write_config(FULL);
        let config = DevbotConfig::from_file_unchecked(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result: Result<DevbotConfig, _> = toml::from_str("[store]\nbackend = \"chroma\"\n");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn world_writable_config_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let file = write_config(FULL);
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666)).unwrap();
        assert!(DevbotConfig::from_file(file.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_api_key_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let file = write_config("[llm]\nprovider = \"openai\"\napi_key = \"sk-secret\"\n");
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(DevbotConfig::from_file(file.path()).is_err());

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        let config = DevbotConfig::from_file(file.path()).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-secret"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = DevbotConfig::from_file("/nonexistent/devbot.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/devbot.toml"));
    }

    #[cfg(unix)]
    #[test]
    fn private_config_without_key_loads() {
        use std::os::unix::fs::PermissionsExt;

        let file = write_config(FULL);
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(DevbotConfig::from_file(file.path()).is_ok());
    }
}
