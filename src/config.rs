//! TOML configuration parsing and validation.
//!
//! LexVault is configured through a single TOML file (default
//! `./config/lexvault.toml`). Every section except `[db]`, `[storage]` and
//! `[security]` may be omitted and falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/lexvault.sqlite"
//!
//! [storage]
//! blob_dir = "./data/blobs"
//!
//! [security]
//! key_file = "./data/secret.key"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 4
//!
//! [embedding]
//! provider = "ollama"
//! model = "llama3"
//! dims = 4096
//!
//! [llm]
//! provider = "ollama"
//! model = "llama3"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one `<uuid>.enc` ciphertext file per document.
    pub blob_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// Raw (or base64) 32-byte key; created with 0600 permissions if absent.
    pub key_file: PathBuf,
    #[serde(default)]
    pub password_hashing: PasswordHashingConfig,
}

/// Argon2id cost parameters for credential hashing.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PasswordHashingConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for PasswordHashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_memory_kib() -> u32 {
    19456
}
fn default_iterations() -> u32 {
    2
}
fn default_parallelism() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Bytes shared between consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hits scoring at or below this cosine similarity are discarded.
    #[serde(default)]
    pub min_score: f32,
    #[serde(default = "default_context_budget")]
    pub context_budget_bytes: usize,
    /// Search every user's chunks instead of only the requester's.
    #[serde(default)]
    pub shared_corpus: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            context_budget_bytes: default_context_budget(),
            shared_corpus: false,
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_context_budget() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama default `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_provider() -> String {
    "extractive".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_llm_max_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// Upper bound on entries returned by a single listing.
    #[serde(default = "default_max_list")]
    pub max_list: usize,
    /// Attempts per append before reporting to the operator channel.
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_list: default_max_list(),
            write_attempts: default_write_attempts(),
        }
    }
}

fn default_max_list() -> usize {
    500
}
fn default_write_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_session_ttl() -> u64 {
    3600
}

impl Config {
    /// A fully offline configuration rooted at `root`: hash embeddings,
    /// extractive answers, and cheap password hashing. Used by tests and
    /// local experiments.
    pub fn ephemeral(root: &Path) -> Self {
        Self {
            db: DbConfig {
                path: root.join("lexvault.sqlite"),
            },
            storage: StorageConfig {
                blob_dir: root.join("blobs"),
            },
            security: SecurityConfig {
                key_file: root.join("secret.key"),
                password_hashing: PasswordHashingConfig {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                },
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                dims: Some(256),
                ..EmbeddingConfig::default()
            },
            llm: LlmConfig::default(),
            audit: AuditConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Check cross-field invariants. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        // Narrower windows cannot hold every UTF-8 character.
        if self.chunking.chunk_size < 4 {
            anyhow::bail!("chunking.chunk_size must be >= 4");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }

        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.context_budget_bytes == 0 {
            anyhow::bail!("retrieval.context_budget_bytes must be > 0");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }

        match self.embedding.provider.as_str() {
            "hash" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.is_remote() {
            if self.embedding.dims.is_none() {
                anyhow::bail!(
                    "embedding.dims must be set when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.llm.provider.as_str() {
            "extractive" | "ollama" | "openai" => {}
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be extractive, ollama, or openai.",
                other
            ),
        }

        if self.audit.max_list == 0 {
            anyhow::bail!("audit.max_list must be >= 1");
        }
        if self.audit.write_attempts == 0 {
            anyhow::bail!("audit.write_attempts must be >= 1");
        }

        let p = &self.security.password_hashing;
        if p.memory_kib < 8 * p.parallelism || p.iterations == 0 || p.parallelism == 0 {
            anyhow::bail!("security.password_hashing parameters are out of range");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/lv/db.sqlite"

[storage]
blob_dir = "/tmp/lv/blobs"

[security]
key_file = "/tmp/lv/secret.key"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(!config.retrieval.shared_corpus);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.llm.provider, "extractive");
        assert_eq!(config.server.bind, "127.0.0.1:7340");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_chunk_size_must_fit_any_character() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.chunking.chunk_size = 3;
        config.chunking.chunk_overlap = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));

        config.chunking.chunk_size = 4;
        config.validate().unwrap();
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.embedding.provider = "openai".to_string();
        assert!(config.validate().is_err());
        config.embedding.dims = Some(1536);
        assert!(config.validate().is_err());
        config.embedding.model = Some("text-embedding-3-small".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.embedding.provider = "magic".to_string();
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.llm.provider = "magic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ephemeral_config_is_valid() {
        let config = Config::ephemeral(Path::new("/tmp/lexvault-test"));
        config.validate().unwrap();
        assert!(config.db.path.ends_with("lexvault.sqlite"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/lexvault.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
