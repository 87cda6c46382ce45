//! Engine configuration.
//!
//! Loaded from an optional `config` file plus `SCRIPTORIUM__`-prefixed
//! environment variables. Every field has a default so the engine can run
//! with no configuration at all.

mod defaults;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

use defaults::{
    default_embeddings, default_limits, default_ollama, default_pipeline, default_retrieval,
};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_ollama")]
    pub ollama: OllamaConfig,

    #[serde(default = "default_embeddings")]
    pub embeddings: EmbeddingsConfig,

    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineConfig,

    #[serde(default = "default_retrieval")]
    pub retrieval: RetrievalConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,
}

/// Ollama endpoint configuration for the bundled capability provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "defaults::default_ollama_url")]
    pub base_url: String,

    /// Model used for summarization and answer generation
    #[serde(default = "defaults::default_chat_model")]
    pub chat_model: String,

    /// Vision-capable model used for image description
    #[serde(default = "defaults::default_vision_model")]
    pub vision_model: String,

    #[serde(default = "defaults::default_temperature")]
    pub temperature: f32,

    #[serde(default = "defaults::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "defaults::default_embedding_model")]
    pub model: String,
}

/// Pipeline tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How many content units are processed concurrently within one document
    #[serde(default = "defaults::default_max_concurrent_units")]
    pub max_concurrent_units: usize,

    /// Additional attempts for transient capability failures
    #[serde(default = "defaults::default_capability_retries")]
    pub capability_retries: u32,

    #[serde(default = "defaults::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Retrieval tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of index entries retrieved per query
    #[serde(default = "defaults::default_top_k")]
    pub top_k: usize,

    /// Per-snippet clamp when building the generation context
    #[serde(default = "defaults::default_max_snippet_chars")]
    pub max_snippet_chars: usize,

    /// Per-source clamp in the structured answer
    #[serde(default = "defaults::default_max_source_chars")]
    pub max_source_chars: usize,
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "defaults::default_max_document_size")]
    pub max_document_size_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ollama: default_ollama(),
            embeddings: default_embeddings(),
            pipeline: default_pipeline(),
            retrieval: default_retrieval(),
            limits: default_limits(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `config.{toml,yaml,json}` (optional) and the
    /// environment (`SCRIPTORIUM__SECTION__KEY`).
    pub fn load() -> EngineResult<Self> {
        use config::{Config as ConfigBuilder, Environment, File};

        ConfigBuilder::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("SCRIPTORIUM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EngineError::Config {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert!(config.pipeline.max_concurrent_units >= 1);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.limits.max_document_size_bytes > 0);
    }

    #[test]
    fn empty_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.embeddings.model, "nomic-embed-text");
        assert_eq!(config.pipeline.capability_retries, 2);
    }
}
