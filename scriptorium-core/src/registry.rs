//! Pipeline registry: authoritative document state and status fan-out.
//!
//! One entry per document id. Status transitions follow the strict order
//! `pending -> processing -> {ready|failed}`; anything else is rejected as a
//! no-op so duplicate or out-of-order events cannot corrupt state. Every
//! applied change emits a [`StatusSnapshot`] on a per-document broadcast
//! channel; subscribers replay the current snapshot first and then receive
//! each new snapshot until a terminal status ends the stream.

use std::pin::Pin;

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::document::{Document, DocumentStatus, StatusSnapshot, UnitCounts, UnitFailure};
use crate::error::{EngineError, EngineResult};

/// Per-subscriber buffer depth. A subscriber that falls further behind than
/// this lags: the oldest snapshots are dropped, the pipeline never blocks.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Finite stream of status snapshots for one document.
pub type StatusStream = Pin<Box<dyn Stream<Item = StatusSnapshot> + Send>>;

struct RegistryEntry {
    document: Document,
    phase: Option<String>,
    progress: Option<usize>,
    total: Option<usize>,
    indexed_units: usize,
    diagnostics: Vec<UnitFailure>,
    embedding_fingerprint: Option<String>,
    tx: broadcast::Sender<StatusSnapshot>,
}

impl RegistryEntry {
    fn new(document: Document) -> Self {
        let (tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            document,
            phase: None,
            progress: None,
            total: None,
            indexed_units: 0,
            diagnostics: Vec::new(),
            embedding_fingerprint: None,
            tx,
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            document_id: self.document.id.clone(),
            filename: self.document.filename.clone(),
            status: self.document.status,
            phase: self.phase.clone(),
            progress: self.progress,
            total: self.total,
            unit_counts: self.document.unit_counts,
            indexed_units: self.indexed_units,
            failed_units: self.diagnostics.len(),
            error: self.document.error.clone(),
            created_at: self.document.created_at,
        }
    }
}

/// Concurrency-safe keyed store of document processing state.
#[derive(Default)]
pub struct PipelineRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Track a newly uploaded document.
    pub fn register(&self, document: Document) {
        debug!(doc_id = %document.id, "Registering document");
        self.entries
            .insert(document.id.clone(), RegistryEntry::new(document));
    }

    /// Apply a status transition.
    ///
    /// Returns `Ok(true)` when applied, `Ok(false)` when the transition would
    /// violate the lifecycle order and was rejected as a no-op. The rejection
    /// is the idempotency guard against duplicate or out-of-order events; it
    /// is logged but never surfaced to end users.
    pub fn transition(
        &self,
        document_id: &str,
        status: DocumentStatus,
        detail: Option<&str>,
    ) -> EngineResult<bool> {
        let Some(mut entry) = self.entries.get_mut(document_id) else {
            return Err(EngineError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        };

        let from = entry.document.status;
        let allowed = matches!(
            (from, status),
            (DocumentStatus::Pending, DocumentStatus::Processing)
                | (DocumentStatus::Processing, DocumentStatus::Ready)
                | (DocumentStatus::Processing, DocumentStatus::Failed)
        );

        if !allowed {
            debug!(
                doc_id = %document_id,
                from = %from,
                to = %status,
                "Rejected out-of-order status transition"
            );
            return Ok(false);
        }

        entry.document.status = status;
        entry.document.error = detail.map(String::from);
        if status.is_terminal() {
            entry.phase = None;
            entry.progress = None;
            entry.total = None;
        }

        info!(doc_id = %document_id, from = %from, to = %status, "Document status changed");

        let snapshot = entry.snapshot();
        let tx = entry.tx.clone();
        drop(entry);
        let _ = tx.send(snapshot);

        Ok(true)
    }

    /// Current status snapshot for a document.
    pub fn get(&self, document_id: &str) -> Option<StatusSnapshot> {
        self.entries.get(document_id).map(|entry| entry.snapshot())
    }

    /// Snapshot of every tracked document.
    pub fn list(&self) -> Vec<StatusSnapshot> {
        self.entries.iter().map(|entry| entry.snapshot()).collect()
    }

    /// Copy of the document record.
    pub fn document(&self, document_id: &str) -> Option<Document> {
        self.entries
            .get(document_id)
            .map(|entry| entry.document.clone())
    }

    /// Subscribe to status snapshots for a document.
    ///
    /// The stream replays the current snapshot first and then yields each new
    /// snapshot; it ends after a terminal status (or immediately after the
    /// replay when the document is already terminal), or when the document is
    /// deleted. Slow consumers drop the oldest snapshots instead of blocking
    /// the pipeline; the replayed snapshot itself is always current.
    pub fn subscribe(&self, document_id: &str) -> Option<StatusStream> {
        // Snapshot and channel subscription happen under the same entry
        // guard, so no transition can slip between them.
        let entry = self.entries.get(document_id)?;
        let first = entry.snapshot();
        let rx = entry.tx.subscribe();
        drop(entry);

        Some(Box::pin(async_stream::stream! {
            let mut rx = rx;
            let replay_terminal = first.status.is_terminal();
            yield first;
            if replay_terminal {
                return;
            }

            loop {
                match rx.recv().await {
                    Ok(snapshot) => {
                        let terminal = snapshot.status.is_terminal();
                        yield snapshot;
                        if terminal {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Status subscriber lagged, dropped oldest snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Remove a document from the registry.
    ///
    /// Dropping the entry closes its broadcast channel, which ends any open
    /// subscription streams. Returns `false` for unknown ids.
    pub fn delete(&self, document_id: &str) -> bool {
        let removed = self.entries.remove(document_id).is_some();
        if removed {
            info!(doc_id = %document_id, "Document removed from registry");
        }
        removed
    }

    /// Record which embedding space a document's collection was built with.
    pub fn set_embedding_fingerprint(&self, document_id: &str, fingerprint: &str) {
        if let Some(mut entry) = self.entries.get_mut(document_id) {
            entry.embedding_fingerprint = Some(fingerprint.to_string());
        }
    }

    pub fn embedding_fingerprint(&self, document_id: &str) -> Option<String> {
        self.entries
            .get(document_id)
            .and_then(|entry| entry.embedding_fingerprint.clone())
    }

    /// Record pipeline phase progress and emit a snapshot.
    pub fn record_phase(&self, document_id: &str, phase: &str, progress: usize, total: usize) {
        let Some(mut entry) = self.entries.get_mut(document_id) else {
            return;
        };
        entry.phase = Some(phase.to_string());
        entry.progress = Some(progress);
        entry.total = Some(total);

        let snapshot = entry.snapshot();
        let tx = entry.tx.clone();
        drop(entry);
        let _ = tx.send(snapshot);
    }

    /// Record the per-kind unit counts produced by extraction.
    pub fn set_unit_counts(&self, document_id: &str, counts: UnitCounts) {
        if let Some(mut entry) = self.entries.get_mut(document_id) {
            entry.document.unit_counts = Some(counts);
        }
    }

    /// Record a successfully indexed unit and emit a snapshot.
    pub fn record_unit_success(&self, document_id: &str) {
        let Some(mut entry) = self.entries.get_mut(document_id) else {
            return;
        };
        entry.indexed_units += 1;
        entry.progress = Some(entry.progress.unwrap_or(0) + 1);

        let snapshot = entry.snapshot();
        let tx = entry.tx.clone();
        drop(entry);
        let _ = tx.send(snapshot);
    }

    /// Record a failed unit as a diagnostic and emit a snapshot.
    pub fn record_unit_failure(&self, document_id: &str, failure: UnitFailure) {
        let Some(mut entry) = self.entries.get_mut(document_id) else {
            return;
        };
        debug!(
            doc_id = %document_id,
            unit_id = %failure.unit_id,
            stage = ?failure.stage,
            detail = %failure.detail,
            "Unit processing failed"
        );
        entry.diagnostics.push(failure);
        entry.progress = Some(entry.progress.unwrap_or(0) + 1);

        let snapshot = entry.snapshot();
        let tx = entry.tx.clone();
        drop(entry);
        let _ = tx.send(snapshot);
    }

    /// Diagnostics accumulated for a document.
    pub fn diagnostics(&self, document_id: &str) -> Vec<UnitFailure> {
        self.entries
            .get(document_id)
            .map(|entry| entry.diagnostics.clone())
            .unwrap_or_default()
    }

    /// Count of successfully indexed units.
    pub fn indexed_units(&self, document_id: &str) -> usize {
        self.entries
            .get(document_id)
            .map(|entry| entry.indexed_units)
            .unwrap_or(0)
    }
}
