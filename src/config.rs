use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemoConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub recall: RecallConfig,
    pub index: IndexConfig,
    pub sync: SyncConfig,
    pub privacy: PrivacyConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Soft cap on database file size; exceeding it triggers retention cleanup.
    pub max_size_mb: u64,
    /// Sessions untouched for this many days are archived by cleanup. 0 disables.
    pub archive_after_days: u64,
    /// Archived sessions untouched for this many days are deleted by cleanup. 0 disables.
    pub delete_after_days: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local` (ONNX Runtime), `remote` (HTTP /embeddings endpoint),
    /// `hashed` (deterministic offline fallback), or `disabled`.
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub cache_dir: String,
    /// Base URL for the `remote` provider (OpenAI-compatible).
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Per-call timeout for remote providers, seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecallConfig {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub min_score: f64,
    pub max_results: usize,
    /// Candidates fetched per search family before merge, for reranking headroom.
    pub candidate_k: usize,
    pub time_decay_factor: f64,
    /// Most recent messages attached per recalled session.
    pub context_messages: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// New messages since the last index that trigger reindexing.
    pub message_threshold: u64,
    /// Idle seconds since the last index that trigger reindexing.
    pub idle_secs: i64,
    pub max_keywords: usize,
    /// Bounded retry attempts for transient embedding failures.
    pub max_retries: u32,
    /// Base backoff delay between retries, milliseconds (doubles per attempt).
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// `disabled`, `local` (replica directory), `remote`, or `saas`.
    pub mode: String,
    /// Replica directory for `local` mode.
    pub replica_dir: Option<String>,
    /// Endpoint for `remote`/`saas` modes.
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Sessions whose work_dir starts with any of these prefixes are never synced.
    pub exclude_paths: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Keywords never written to the lexical index, summary, or embedding text.
    pub sensitive_keywords: Vec<String>,
    /// Recognized but unsupported in this build — see validate().
    pub encrypt_local: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnemo_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            max_size_mb: 2048,
            archive_after_days: 0,
            delete_after_days: 0,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_mnemo_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            dimensions: 384,
            cache_dir,
            endpoint: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.6,
            keyword_weight: 0.4,
            min_score: 0.75,
            max_results: 5,
            candidate_k: 20,
            time_decay_factor: 0.001,
            context_messages: 3,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            message_threshold: 5,
            idle_secs: 600,
            max_keywords: 10,
            max_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: "disabled".into(),
            replica_dir: None,
            endpoint: None,
            token: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
            exclude_paths: Vec::new(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            sensitive_keywords: Vec::new(),
            encrypt_local: false,
        }
    }
}

/// Returns `~/.mnemo/`
pub fn default_mnemo_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".mnemo")
}

/// Returns the default config file path: `~/.mnemo/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemo_dir().join("config.toml")
}

impl MnemoConfig {
    /// Load config from the default TOML file (if it exists) then apply env
    /// var overrides and validate.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemoConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMO_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMO_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMO_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("MNEMO_SYNC_MODE") {
            self.sync.mode = val;
        }
        if let Ok(val) = std::env::var("MNEMO_SYNC_TOKEN") {
            self.sync.token = Some(val);
        }
    }

    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be positive");
        }
        if self.recall.vector_weight < 0.0 || self.recall.keyword_weight < 0.0 {
            bail!("recall weights must be non-negative");
        }
        if self.recall.vector_weight + self.recall.keyword_weight <= 0.0 {
            bail!("at least one recall weight must be positive");
        }
        match self.embedding.provider.as_str() {
            "local" | "remote" | "hashed" | "disabled" => {}
            other => bail!("unknown embedding provider: {other}"),
        }
        if self.embedding.provider == "remote" && self.embedding.endpoint.is_none() {
            bail!("embedding.endpoint is required for the remote provider");
        }
        match self.sync.mode.as_str() {
            "disabled" | "local" | "remote" | "saas" => {}
            other => bail!("unknown sync mode: {other}"),
        }
        if self.sync.mode == "local" && self.sync.replica_dir.is_none() {
            bail!("sync.replica_dir is required for local sync mode");
        }
        if (self.sync.mode == "remote" || self.sync.mode == "saas")
            && self.sync.endpoint.is_none()
        {
            bail!("sync.endpoint is required for {} sync mode", self.sync.mode);
        }
        if self.privacy.encrypt_local {
            bail!(
                "privacy.encrypt_local is not supported in this build; \
                 use filesystem-level encryption instead"
            );
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MnemoConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.recall.vector_weight, 0.6);
        assert_eq!(config.recall.keyword_weight, 0.4);
        assert_eq!(config.recall.min_score, 0.75);
        assert_eq!(config.recall.max_results, 5);
        assert_eq!(config.index.message_threshold, 5);
        assert_eq!(config.index.idle_secs, 600);
        assert_eq!(config.sync.mode, "disabled");
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"
max_size_mb = 512

[recall]
max_results = 10
min_score = 0.5

[sync]
mode = "local"
replica_dir = "/tmp/replica"
exclude_paths = ["/home/user/secret"]
"#;
        let config: MnemoConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.storage.max_size_mb, 512);
        assert_eq!(config.recall.max_results, 10);
        assert_eq!(config.sync.mode, "local");
        assert_eq!(config.sync.exclude_paths, vec!["/home/user/secret"]);
        // defaults still apply for unset fields
        assert_eq!(config.recall.candidate_k, 20);
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn local_sync_requires_replica_dir() {
        let mut config = MnemoConfig::default();
        config.sync.mode = "local".into();
        assert!(config.validate().is_err());
        config.sync.replica_dir = Some("/tmp/replica".into());
        config.validate().unwrap();
    }

    #[test]
    fn remote_embedding_requires_endpoint() {
        let mut config = MnemoConfig::default();
        config.embedding.provider = "remote".into();
        assert!(config.validate().is_err());
        config.embedding.endpoint = Some("https://api.example.com/v1".into());
        config.validate().unwrap();
    }

    #[test]
    fn encrypt_local_is_rejected() {
        let mut config = MnemoConfig::default();
        config.privacy.encrypt_local = true;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("encrypt_local"));
    }

    #[test]
    fn zero_weights_are_rejected() {
        let mut config = MnemoConfig::default();
        config.recall.vector_weight = 0.0;
        config.recall.keyword_weight = 0.0;
        assert!(config.validate().is_err());
    }
}
