//! Data model shared across the pipeline, registry, index, and query engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded, waiting for the pipeline to pick it up
    Pending,
    /// Pipeline is extracting, summarizing, and indexing content
    Processing,
    /// At least one content unit was indexed; the document is queryable
    Ready,
    /// Extraction failed or no content unit could be indexed
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Failed)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document record, owned by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the uploaded bytes, for duplicate detection
    pub content_hash: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-kind unit counts, recorded once extraction has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_counts: Option<UnitCounts>,
    pub created_at: DateTime<Utc>,
}

/// Kind of content unit produced by extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Text,
    Table,
    Image,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Text => "text",
            UnitKind::Table => "table",
            UnitKind::Image => "image",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed content unit extracted from a document
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// Unique within the owning document
    pub id: String,
    pub kind: UnitKind,
    pub payload: UnitPayload,
    pub page: Option<u32>,
    /// Section heading the unit appeared under, when the format has one
    pub section: Option<String>,
}

/// Raw content carried by a unit
#[derive(Debug, Clone)]
pub enum UnitPayload {
    Text { body: String },
    Table { body: String },
    Image { data: Bytes, filename: Option<String> },
}

/// Per-kind counts of extracted units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounts {
    pub texts: usize,
    pub tables: usize,
    pub images: usize,
}

impl UnitCounts {
    pub fn tally(units: &[ContentUnit]) -> Self {
        let mut counts = UnitCounts::default();
        for unit in units {
            match unit.kind {
                UnitKind::Text => counts.texts += 1,
                UnitKind::Table => counts.tables += 1,
                UnitKind::Image => counts.images += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.texts + self.tables + self.images
    }
}

/// Stage of per-unit processing where a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStage {
    Surrogate,
    Embedding,
    Indexing,
}

/// Diagnostic entry for a unit that could not be indexed.
///
/// Unit failures are non-fatal; they accumulate on the registry entry and are
/// reported alongside the terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub kind: UnitKind,
    pub stage: UnitStage,
    pub detail: String,
}

/// The unit of storage in the multi-vector index.
///
/// The vector is computed from the surrogate text, but the entry carries the
/// original content payload so retrieval never needs a join against a
/// separate content store.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub document_id: String,
    pub unit_id: String,
    pub kind: UnitKind,
    /// Surrogate text the vector was derived from
    pub surrogate: String,
    pub vector: Vec<f32>,
    pub content: EntryContent,
    pub page: Option<u32>,
    pub section: Option<String>,
}

/// Original content stored alongside the searchable vector
#[derive(Debug, Clone)]
pub enum EntryContent {
    Text { body: String },
    Table { body: String },
    Image {
        filename: Option<String>,
        description: String,
    },
}

impl EntryContent {
    /// Text used when grounding an answer in this entry.
    pub fn grounding_text(&self) -> &str {
        match self {
            EntryContent::Text { body } | EntryContent::Table { body } => body,
            EntryContent::Image { description, .. } => description,
        }
    }
}

/// Point-in-time view of a document's processing state, pushed to status
/// subscribers and returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub document_id: String,
    pub filename: String,
    pub status: DocumentStatus,
    /// Current pipeline phase ("extracting", "indexing") while processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_counts: Option<UnitCounts>,
    pub indexed_units: usize,
    pub failed_units: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_and_terminality() {
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
        assert!(DocumentStatus::Ready.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
    }

    #[test]
    fn unit_counts_tally() {
        let units = vec![
            ContentUnit {
                id: "text-000".to_string(),
                kind: UnitKind::Text,
                payload: UnitPayload::Text {
                    body: "a".to_string(),
                },
                page: None,
                section: None,
            },
            ContentUnit {
                id: "table-001".to_string(),
                kind: UnitKind::Table,
                payload: UnitPayload::Table {
                    body: "|a|".to_string(),
                },
                page: None,
                section: None,
            },
        ];

        let counts = UnitCounts::tally(&units);
        assert_eq!(counts.texts, 1);
        assert_eq!(counts.tables, 1);
        assert_eq!(counts.images, 0);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Ready).unwrap(),
            "\"ready\""
        );
    }
}
