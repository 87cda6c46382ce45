//! Query engine: grounded question answering over a ready document.
//!
//! Ranking happens in surrogate-vector space, but the generation prompt is
//! built from the retrieved RAW content (text bodies, table bodies, image
//! descriptions), so answers are grounded in what the document actually
//! says, not in the search surrogates.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capability::{AnswerGenerator, EmbeddingProvider};
use crate::config::RetrievalConfig;
use crate::document::{DocumentStatus, EntryContent, IndexEntry, UnitKind};
use crate::error::{EngineError, EngineResult};
use crate::index::MultiVectorIndex;
use crate::registry::PipelineRegistry;

/// Structured answer with citations back to the source units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnswer {
    pub document_id: String,
    pub text: String,
    /// Unit ids of every retrieved entry, in rank order
    pub cited_unit_ids: Vec<String>,
    pub sources: Vec<SourceInfo>,
    pub related_images: Vec<RelatedImage>,
    pub elapsed_secs: f64,
}

/// One retrieved source backing the answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub unit_id: String,
    pub kind: UnitKind,
    /// Raw content, clamped for transport
    pub content: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// Image entry related to the question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedImage {
    pub unit_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub description: String,
}

/// Read-only query path over the registry and index.
pub struct QueryEngine {
    registry: Arc<PipelineRegistry>,
    index: Arc<MultiVectorIndex>,
    embeddings: Arc<dyn EmbeddingProvider>,
    answerer: Arc<dyn AnswerGenerator>,
    config: RetrievalConfig,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        index: Arc<MultiVectorIndex>,
        embeddings: Arc<dyn EmbeddingProvider>,
        answerer: Arc<dyn AnswerGenerator>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            registry,
            index,
            embeddings,
            answerer,
            config,
        }
    }

    /// Answer a question against one document.
    ///
    /// Fails fast (before any capability call) when the document is unknown
    /// or not yet ready, and when the collection was indexed in a different
    /// embedding space than the current provider would query in.
    pub async fn answer(&self, document_id: &str, question: &str) -> EngineResult<DocumentAnswer> {
        let started = Instant::now();

        let document =
            self.registry
                .document(document_id)
                .ok_or_else(|| EngineError::DocumentNotFound {
                    document_id: document_id.to_string(),
                })?;

        if document.status != DocumentStatus::Ready {
            return Err(EngineError::DocumentNotReady {
                document_id: document_id.to_string(),
                status: document.status,
            });
        }

        let current = self.embeddings.fingerprint();
        if let Some(indexed) = self.registry.embedding_fingerprint(document_id)
            && indexed != current
        {
            return Err(EngineError::EmbeddingSpaceMismatch { indexed, current });
        }

        let query_vector = self.embeddings.embed(question).await?;
        let retrieved = self
            .index
            .search(document_id, &query_vector, self.config.top_k);

        debug!(
            doc_id = %document_id,
            results = retrieved.len(),
            "Retrieved entries for question"
        );

        let context = build_context(&retrieved, self.config.max_snippet_chars);
        let text = self.answerer.generate(&context, question).await?;

        let cited_unit_ids = retrieved
            .iter()
            .map(|(entry, _)| entry.unit_id.clone())
            .collect();

        let sources = retrieved
            .iter()
            .map(|(entry, score)| SourceInfo {
                unit_id: entry.unit_id.clone(),
                kind: entry.kind,
                content: truncate_chars(entry.content.grounding_text(), self.config.max_source_chars),
                score: *score,
                page: entry.page,
                section: entry.section.clone(),
            })
            .collect();

        let related_images = retrieved
            .iter()
            .filter_map(|(entry, _)| match &entry.content {
                EntryContent::Image {
                    filename,
                    description,
                } => Some(RelatedImage {
                    unit_id: entry.unit_id.clone(),
                    filename: filename.clone(),
                    description: description.clone(),
                }),
                _ => None,
            })
            .collect();

        info!(
            doc_id = %document_id,
            results = retrieved.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query answered"
        );

        Ok(DocumentAnswer {
            document_id: document_id.to_string(),
            text,
            cited_unit_ids,
            sources,
            related_images,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }
}

/// Assemble the generation context from retrieved raw content, grouped by
/// kind and clamped per snippet.
fn build_context(retrieved: &[(IndexEntry, f32)], max_snippet_chars: usize) -> String {
    let mut texts = Vec::new();
    let mut tables = Vec::new();
    let mut images = Vec::new();

    for (entry, _) in retrieved {
        let snippet = truncate_chars(entry.content.grounding_text(), max_snippet_chars);
        match entry.kind {
            UnitKind::Text => texts.push(snippet),
            UnitKind::Table => tables.push(snippet),
            UnitKind::Image => images.push(snippet),
        }
    }

    let mut parts = Vec::new();
    for (header, snippets) in [
        ("TEXT CONTEXT:", texts),
        ("TABLE CONTEXT:", tables),
        ("IMAGE CONTEXT:", images),
    ] {
        if snippets.is_empty() {
            continue;
        }
        parts.push(header.to_string());
        for (i, snippet) in snippets.iter().enumerate() {
            parts.push(format!("{}. {}", i + 1, snippet));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}

/// Clamp to a maximum number of characters, respecting char boundaries.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clamped: String = text.chars().take(max_chars).collect();
    format!("{clamped}...")
}
