//! Default value functions for EngineConfig.

use super::{EmbeddingsConfig, LimitsConfig, OllamaConfig, PipelineConfig, RetrievalConfig};

// ==================== Top-level Section Defaults ====================

pub(crate) fn default_ollama() -> OllamaConfig {
    OllamaConfig {
        base_url: default_ollama_url(),
        chat_model: default_chat_model(),
        vision_model: default_vision_model(),
        temperature: default_temperature(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_embeddings() -> EmbeddingsConfig {
    EmbeddingsConfig {
        model: default_embedding_model(),
    }
}

pub(crate) fn default_pipeline() -> PipelineConfig {
    PipelineConfig {
        max_concurrent_units: default_max_concurrent_units(),
        capability_retries: default_capability_retries(),
        retry_backoff_ms: default_retry_backoff_ms(),
    }
}

pub(crate) fn default_retrieval() -> RetrievalConfig {
    RetrievalConfig {
        top_k: default_top_k(),
        max_snippet_chars: default_max_snippet_chars(),
        max_source_chars: default_max_source_chars(),
    }
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_document_size_bytes: default_max_document_size(),
    }
}

// ==================== Ollama Defaults ====================

pub(crate) fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) fn default_chat_model() -> String {
    "llama3.2".to_string()
}

pub(crate) fn default_vision_model() -> String {
    "llava".to_string()
}

pub(crate) fn default_temperature() -> f32 {
    0.3
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    120
}

// ==================== Embeddings Defaults ====================

pub(crate) fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

// ==================== Pipeline Defaults ====================

pub(crate) fn default_max_concurrent_units() -> usize {
    3
}

pub(crate) fn default_capability_retries() -> u32 {
    2
}

pub(crate) fn default_retry_backoff_ms() -> u64 {
    500
}

// ==================== Retrieval Defaults ====================

pub(crate) fn default_top_k() -> usize {
    5
}

pub(crate) fn default_max_snippet_chars() -> usize {
    1000
}

pub(crate) fn default_max_source_chars() -> usize {
    500
}

// ==================== Limits Defaults ====================

pub(crate) fn default_max_document_size() -> u64 {
    52_428_800 // 50MB
}
