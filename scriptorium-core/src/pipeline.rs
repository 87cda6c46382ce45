//! Document processing pipeline.
//!
//! Takes one document from raw bytes to a terminal status: extract content
//! units, generate a surrogate per unit, embed it, and write the index
//! entry. Unit failures are non-fatal and accumulate as diagnostics; only
//! extraction failure (or zero indexed units) fails the document. All state
//! changes go through the registry, which fans progress out to subscribers.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capability::{ContentExtractor, EmbeddingProvider, SurrogateGenerator};
use crate::config::PipelineConfig;
use crate::document::{
    ContentUnit, DocumentStatus, EntryContent, IndexEntry, UnitCounts, UnitFailure, UnitPayload,
    UnitStage,
};
use crate::error::CapabilityError;
use crate::index::MultiVectorIndex;
use crate::registry::PipelineRegistry;

/// Orchestrates extraction, surrogate generation, embedding, and indexing
/// for single documents.
pub struct DocumentPipeline {
    registry: Arc<PipelineRegistry>,
    index: Arc<MultiVectorIndex>,
    extractor: Arc<dyn ContentExtractor>,
    surrogates: Arc<dyn SurrogateGenerator>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: PipelineConfig,
}

impl DocumentPipeline {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        index: Arc<MultiVectorIndex>,
        extractor: Arc<dyn ContentExtractor>,
        surrogates: Arc<dyn SurrogateGenerator>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            index,
            extractor,
            surrogates,
            embeddings,
            config,
        }
    }

    /// Process one document to a terminal status.
    ///
    /// Invoked exactly once per document, off the request path. Every outcome
    /// is recorded through the registry; the cancellation token is observed
    /// between units, so deletion stops further index writes.
    pub async fn run(
        &self,
        document_id: &str,
        filename: &str,
        content: Bytes,
        cancel: CancellationToken,
    ) {
        match self
            .registry
            .transition(document_id, DocumentStatus::Processing, None)
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(doc_id = %document_id, "Document was not pending, skipping pipeline run");
                return;
            }
            Err(_) => {
                info!(doc_id = %document_id, "Document removed before processing started");
                return;
            }
        }

        self.registry
            .set_embedding_fingerprint(document_id, &self.embeddings.fingerprint());

        // Step 1: extraction. Total failure here is fatal for the document.
        self.registry.record_phase(document_id, "extracting", 0, 1);

        let units = match self.extractor.extract(filename, &content).await {
            Ok(units) => units,
            Err(e) => {
                error!(doc_id = %document_id, error = %e, "Content extraction failed");
                self.fail(document_id, &e.to_string());
                return;
            }
        };

        let counts = UnitCounts::tally(&units);
        self.registry.set_unit_counts(document_id, counts);
        info!(
            doc_id = %document_id,
            texts = counts.texts,
            tables = counts.tables,
            images = counts.images,
            "Content extracted"
        );

        if units.is_empty() {
            self.fail(document_id, "no content could be indexed");
            return;
        }

        if cancel.is_cancelled() {
            info!(doc_id = %document_id, "Document processing cancelled before indexing");
            return;
        }

        // Step 2: per-unit surrogate -> embedding -> index write, with
        // bounded concurrency. Units are independent; a failed unit is
        // recorded and skipped.
        let total = counts.total();
        self.registry.record_phase(document_id, "indexing", 0, total);

        let mut indexed = 0usize;
        let mut outcomes = futures::stream::iter(units.into_iter().map(|unit| {
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.process_unit(document_id, unit).await)
            }
        }))
        .buffer_unordered(self.config.max_concurrent_units.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Some(Ok(())) => {
                    indexed += 1;
                    self.registry.record_unit_success(document_id);
                }
                Some(Err(failure)) => {
                    self.registry.record_unit_failure(document_id, failure);
                }
                None => {}
            }

            // Cancellation checked between unit completions
            if cancel.is_cancelled() {
                break;
            }
        }
        drop(outcomes);

        if cancel.is_cancelled() {
            info!(doc_id = %document_id, "Document processing cancelled");
            return;
        }

        // Step 3: terminal status. Ready as long as anything was indexed.
        if indexed > 0 {
            if let Err(e) = self
                .registry
                .transition(document_id, DocumentStatus::Ready, None)
            {
                warn!(doc_id = %document_id, error = %e, "Failed to mark document as ready");
                return;
            }
            info!(
                doc_id = %document_id,
                indexed = indexed,
                failed = total - indexed,
                "Document processing complete"
            );
        } else {
            self.fail(document_id, "no content could be indexed");
        }
    }

    /// Transition a document to failed, tolerating concurrent deletion.
    fn fail(&self, document_id: &str, detail: &str) {
        match self
            .registry
            .transition(document_id, DocumentStatus::Failed, Some(detail))
        {
            Ok(_) => {}
            Err(e) => {
                warn!(
                    doc_id = %document_id,
                    original_error = %detail,
                    update_error = %e,
                    "Failed to mark document as failed"
                );
            }
        }
    }

    /// Process a single content unit: surrogate -> embedding -> index entry.
    async fn process_unit(&self, document_id: &str, unit: ContentUnit) -> Result<(), UnitFailure> {
        let ContentUnit {
            id: unit_id,
            kind,
            payload,
            page,
            section,
        } = unit;

        let surrogate = match &payload {
            UnitPayload::Text { body } => {
                self.with_retries(|| self.surrogates.summarize_text(body))
                    .await
            }
            UnitPayload::Table { body } => {
                self.with_retries(|| self.surrogates.summarize_table(body))
                    .await
            }
            UnitPayload::Image { data, .. } => {
                self.with_retries(|| self.surrogates.describe_image(data))
                    .await
            }
        }
        .map_err(|e| UnitFailure {
            unit_id: unit_id.clone(),
            kind,
            stage: UnitStage::Surrogate,
            detail: e.to_string(),
        })?;

        let vector = self
            .with_retries(|| self.embeddings.embed(&surrogate))
            .await
            .map_err(|e| UnitFailure {
                unit_id: unit_id.clone(),
                kind,
                stage: UnitStage::Embedding,
                detail: e.to_string(),
            })?;

        let content = match payload {
            UnitPayload::Text { body } => EntryContent::Text { body },
            UnitPayload::Table { body } => EntryContent::Table { body },
            UnitPayload::Image { filename, .. } => EntryContent::Image {
                filename,
                description: surrogate.clone(),
            },
        };

        let entry = IndexEntry {
            document_id: document_id.to_string(),
            unit_id: unit_id.clone(),
            kind,
            surrogate,
            vector,
            content,
            page,
            section,
        };

        // The collection disappears when the document is deleted mid-run;
        // the write is dropped rather than resurrecting it.
        if !self.index.upsert(document_id, entry) {
            return Err(UnitFailure {
                unit_id,
                kind,
                stage: UnitStage::Indexing,
                detail: "collection no longer exists".to_string(),
            });
        }

        debug!(doc_id = %document_id, unit_id = %unit_id, kind = %kind, "Unit indexed");
        Ok(())
    }

    /// Retry transient capability failures a bounded number of times.
    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.capability_retries => {
                    attempt += 1;
                    warn!(
                        attempt = attempt,
                        max_attempts = self.config.capability_retries,
                        error = %e,
                        "Transient capability failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::capability::ContentExtractor;
    use crate::capability::testing::{MockEmbeddings, MockSurrogates};
    use crate::document::Document;
    use crate::error::ExtractionError;
    use crate::extract::MarkdownExtractor;

    struct FailingExtractor;

    #[async_trait]
    impl ContentExtractor for FailingExtractor {
        async fn extract(
            &self,
            _filename: &str,
            _content: &[u8],
        ) -> Result<Vec<ContentUnit>, ExtractionError> {
            Err(ExtractionError::Failed {
                message: "corrupt container".to_string(),
            })
        }
    }

    /// Embedding provider that fails transiently a fixed number of times.
    struct FlakyEmbeddings {
        remaining_failures: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbeddings {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
            if self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CapabilityError::Unavailable {
                    message: "warming up".to_string(),
                });
            }
            Ok(MockEmbeddings::encode(text, 16))
        }

        fn fingerprint(&self) -> String {
            "mock:flaky".to_string()
        }
    }

    fn document(id: &str, filename: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: filename.to_string(),
            size_bytes: 0,
            content_hash: "deadbeef".to_string(),
            status: DocumentStatus::Pending,
            error: None,
            unit_counts: None,
            created_at: Utc::now(),
        }
    }

    fn pipeline_with(
        surrogates: Arc<MockSurrogates>,
        embeddings: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> (DocumentPipeline, Arc<PipelineRegistry>, Arc<MultiVectorIndex>) {
        let registry = Arc::new(PipelineRegistry::new());
        let index = Arc::new(MultiVectorIndex::new());
        let config = PipelineConfig {
            max_concurrent_units: 3,
            capability_retries: 2,
            retry_backoff_ms: 1,
        };
        let pipeline = DocumentPipeline::new(
            registry.clone(),
            index.clone(),
            extractor,
            surrogates,
            embeddings,
            config,
        );
        (pipeline, registry, index)
    }

    fn multimodal_markdown() -> String {
        use base64::Engine;
        format!(
            "# Intro\n\nFirst part.\n\n# Data\n\nNumbers below.\n\n| a | b |\n|---|---|\n\n![figure](data:image/png;base64,{})\n",
            base64::engine::general_purpose::STANDARD.encode(b"png")
        )
    }

    #[tokio::test]
    async fn happy_path_reaches_ready() {
        let (pipeline, registry, index) = pipeline_with(
            Arc::new(MockSurrogates::default()),
            Arc::new(MockEmbeddings::new("mock:test")),
            Arc::new(MarkdownExtractor),
        );

        registry.register(document("doc-1", "manual.md"));
        index.create_collection("doc-1");

        pipeline
            .run(
                "doc-1",
                "manual.md",
                Bytes::from(multimodal_markdown()),
                CancellationToken::new(),
            )
            .await;

        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Ready);
        assert_eq!(snapshot.indexed_units, 4);
        assert_eq!(snapshot.failed_units, 0);
        assert_eq!(
            snapshot.unit_counts.unwrap(),
            UnitCounts {
                texts: 2,
                tables: 1,
                images: 1
            }
        );
        assert_eq!(index.collection_len("doc-1"), 4);
        assert_eq!(
            registry.embedding_fingerprint("doc-1").as_deref(),
            Some("mock:test")
        );
    }

    #[tokio::test]
    async fn failed_image_is_a_diagnostic_not_a_failure() {
        let surrogates = Arc::new(MockSurrogates {
            fail_images: true,
            ..Default::default()
        });
        let (pipeline, registry, index) = pipeline_with(
            surrogates,
            Arc::new(MockEmbeddings::new("mock:test")),
            Arc::new(MarkdownExtractor),
        );

        use base64::Engine;
        let markdown = format!(
            "# A\n\none\n\n# B\n\ntwo\n\n# C\n\nthree\n\n![fig](data:image/png;base64,{})\n",
            base64::engine::general_purpose::STANDARD.encode(b"png")
        );

        registry.register(document("doc-1", "doc.md"));
        index.create_collection("doc-1");

        pipeline
            .run(
                "doc-1",
                "doc.md",
                Bytes::from(markdown),
                CancellationToken::new(),
            )
            .await;

        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Ready);
        assert_eq!(snapshot.indexed_units, 3);
        assert_eq!(snapshot.failed_units, 1);

        let diagnostics = registry.diagnostics("doc-1");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].stage, UnitStage::Surrogate);
        assert!(index.collection_len("doc-1") <= 3);
    }

    #[tokio::test]
    async fn extraction_failure_is_terminal() {
        let (pipeline, registry, index) = pipeline_with(
            Arc::new(MockSurrogates::default()),
            Arc::new(MockEmbeddings::new("mock:test")),
            Arc::new(FailingExtractor),
        );

        registry.register(document("doc-1", "bad.md"));
        index.create_collection("doc-1");

        pipeline
            .run(
                "doc-1",
                "bad.md",
                Bytes::from_static(b"whatever"),
                CancellationToken::new(),
            )
            .await;

        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Failed);
        assert!(snapshot.error.unwrap().contains("corrupt container"));
        assert_eq!(index.collection_len("doc-1"), 0);
    }

    #[tokio::test]
    async fn all_units_failing_fails_the_document() {
        let surrogates = Arc::new(MockSurrogates {
            fail_text: true,
            fail_tables: true,
            fail_images: true,
            ..Default::default()
        });
        let (pipeline, registry, index) = pipeline_with(
            surrogates,
            Arc::new(MockEmbeddings::new("mock:test")),
            Arc::new(MarkdownExtractor),
        );

        registry.register(document("doc-1", "doc.md"));
        index.create_collection("doc-1");

        pipeline
            .run(
                "doc-1",
                "doc.md",
                Bytes::from_static(b"# Only\n\nsection\n"),
                CancellationToken::new(),
            )
            .await;

        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("no content could be indexed")
        );
        assert_eq!(snapshot.failed_units, 1);
    }

    #[tokio::test]
    async fn empty_document_fails() {
        let (pipeline, registry, index) = pipeline_with(
            Arc::new(MockSurrogates::default()),
            Arc::new(MockEmbeddings::new("mock:test")),
            Arc::new(MarkdownExtractor),
        );

        registry.register(document("doc-1", "empty.md"));
        index.create_collection("doc-1");

        pipeline
            .run(
                "doc-1",
                "empty.md",
                Bytes::from_static(b"  \n"),
                CancellationToken::new(),
            )
            .await;

        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("no content could be indexed")
        );
    }

    #[tokio::test]
    async fn transient_embedding_failures_are_retried() {
        let (pipeline, registry, index) = pipeline_with(
            Arc::new(MockSurrogates::default()),
            Arc::new(FlakyEmbeddings {
                remaining_failures: AtomicUsize::new(2),
            }),
            Arc::new(MarkdownExtractor),
        );

        registry.register(document("doc-1", "doc.md"));
        index.create_collection("doc-1");

        pipeline
            .run(
                "doc-1",
                "doc.md",
                Bytes::from_static(b"# Only\n\nsection\n"),
                CancellationToken::new(),
            )
            .await;

        // Two transient failures fit within capability_retries = 2
        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Ready);
        assert_eq!(index.collection_len("doc-1"), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_run_writes_nothing() {
        let (pipeline, registry, index) = pipeline_with(
            Arc::new(MockSurrogates::default()),
            Arc::new(MockEmbeddings::new("mock:test")),
            Arc::new(MarkdownExtractor),
        );

        registry.register(document("doc-1", "doc.md"));
        index.create_collection("doc-1");

        let cancel = CancellationToken::new();
        cancel.cancel();

        pipeline
            .run(
                "doc-1",
                "doc.md",
                Bytes::from_static(b"# Only\n\nsection\n"),
                cancel,
            )
            .await;

        // The run stops after extraction; no terminal transition, no writes
        let snapshot = registry.get("doc-1").unwrap();
        assert_eq!(snapshot.status, DocumentStatus::Processing);
        assert_eq!(index.collection_len("doc-1"), 0);
    }
}
