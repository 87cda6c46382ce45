//! Engine facade: the boundary the core exposes to a transport layer.
//!
//! Owns the registry, index, capability providers, and per-document
//! cancellation tokens. Upload returns immediately with a pending document
//! and spawns the pipeline in the background; everything else is a thin,
//! safe view over the registry and query engine.

mod cancellation;

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::capability::{
    AnswerGenerator, ContentExtractor, EmbeddingProvider, SurrogateGenerator,
};
use crate::config::EngineConfig;
use crate::document::{Document, DocumentStatus, StatusSnapshot};
use crate::error::{EngineError, EngineResult};
use crate::extract::MarkdownExtractor;
use crate::index::MultiVectorIndex;
use crate::pipeline::DocumentPipeline;
use crate::providers::OllamaProvider;
use crate::query::{DocumentAnswer, QueryEngine};
use crate::registry::{PipelineRegistry, StatusStream};

/// Main engine coordinator
pub struct DocumentEngine {
    config: EngineConfig,
    registry: Arc<PipelineRegistry>,
    index: Arc<MultiVectorIndex>,
    pipeline: Arc<DocumentPipeline>,
    query: QueryEngine,
    cancellation_tokens: Arc<DashMap<String, CancellationToken>>,
}

impl DocumentEngine {
    /// Create an engine wired to the bundled Ollama provider and the
    /// built-in Markdown extractor.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let provider = Arc::new(OllamaProvider::new(
            config.ollama.clone(),
            config.embeddings.clone(),
        )?);

        Ok(Self::with_capabilities(
            config,
            Arc::new(MarkdownExtractor),
            provider.clone(),
            provider.clone(),
            provider,
        ))
    }

    /// Create an engine with explicit capability implementations.
    pub fn with_capabilities(
        config: EngineConfig,
        extractor: Arc<dyn ContentExtractor>,
        surrogates: Arc<dyn SurrogateGenerator>,
        embeddings: Arc<dyn EmbeddingProvider>,
        answerer: Arc<dyn AnswerGenerator>,
    ) -> Self {
        let registry = Arc::new(PipelineRegistry::new());
        let index = Arc::new(MultiVectorIndex::new());

        let pipeline = Arc::new(DocumentPipeline::new(
            registry.clone(),
            index.clone(),
            extractor,
            surrogates,
            embeddings.clone(),
            config.pipeline.clone(),
        ));

        let query = QueryEngine::new(
            registry.clone(),
            index.clone(),
            embeddings,
            answerer,
            config.retrieval.clone(),
        );

        Self {
            config,
            registry,
            index,
            pipeline,
            query,
            cancellation_tokens: Arc::new(DashMap::new()),
        }
    }

    /// Accept a document and queue it for processing.
    ///
    /// Returns immediately with the pending document record; the pipeline
    /// runs on a background task and reports through the registry.
    pub fn upload(&self, filename: &str, content: Bytes) -> EngineResult<Document> {
        let max_size = self.config.limits.max_document_size_bytes;
        if content.len() as u64 > max_size {
            return Err(EngineError::InvalidDocument {
                message: format!(
                    "file too large: {} bytes (max {} bytes)",
                    content.len(),
                    max_size
                ),
            });
        }

        // Content hash for duplicate detection by callers
        let content_hash = format!("{:x}", Sha256::digest(&content));

        let doc_id = Uuid::new_v4().to_string();
        let document = Document {
            id: doc_id.clone(),
            filename: filename.to_string(),
            size_bytes: content.len() as u64,
            content_hash,
            status: DocumentStatus::Pending,
            error: None,
            unit_counts: None,
            created_at: Utc::now(),
        };

        self.registry.register(document.clone());
        self.index.create_collection(&doc_id);
        let cancel = self.register_processing_token(&doc_id);

        let pipeline = self.pipeline.clone();
        let tokens = self.cancellation_tokens.clone();
        let task_doc_id = doc_id.clone();
        let task_filename = filename.to_string();

        tokio::spawn(async move {
            pipeline
                .run(&task_doc_id, &task_filename, content, cancel)
                .await;
            tokens.remove(&task_doc_id);
        });

        info!(
            doc_id = %doc_id,
            filename = %filename,
            "Document uploaded and queued for processing"
        );

        Ok(document)
    }

    /// Current status snapshot for a document.
    pub fn status(&self, document_id: &str) -> Option<StatusSnapshot> {
        self.registry.get(document_id)
    }

    /// Status snapshots for every tracked document.
    pub fn list(&self) -> Vec<StatusSnapshot> {
        self.registry.list()
    }

    /// Subscribe to status snapshots for a document. `None` for unknown ids.
    pub fn subscribe(&self, document_id: &str) -> Option<StatusStream> {
        self.registry.subscribe(document_id)
    }

    /// Answer a question against a ready document.
    pub async fn query(&self, document_id: &str, question: &str) -> EngineResult<DocumentAnswer> {
        self.query.answer(document_id, question).await
    }

    /// Delete a document, its registry entry, and its index collection.
    ///
    /// Cancels in-flight processing first so no further index writes land.
    /// Idempotent: deleting an unknown id returns `false`, not an error.
    pub fn delete(&self, document_id: &str) -> bool {
        let was_processing = self.cancel_processing(document_id);
        if was_processing {
            info!(doc_id = %document_id, "Cancelled in-progress processing for deleted document");
        }

        let removed = self.registry.delete(document_id);
        self.index.delete_collection(document_id);

        if removed {
            info!(doc_id = %document_id, "Document deleted");
        }
        removed
    }
}
