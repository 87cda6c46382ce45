//! Multi-vector retrieval index.
//!
//! Stores, per document collection, the mapping from surrogate vector to
//! original content. Searching ranks by cosine similarity over surrogate
//! vectors but returns the full [`IndexEntry`], so a hit always resolves to
//! the exact source content without a join against a separate store.

use std::sync::RwLock;

use dashmap::DashMap;
use tracing::debug;

use crate::document::IndexEntry;

/// In-memory vector index with per-document collections.
///
/// Collections are isolated namespaces: one per document, created when its
/// pipeline starts and deleted atomically with the document. Writes within a
/// collection are serialized by the collection lock, so a concurrently
/// running search observes either none or all of an entry.
#[derive(Debug, Default)]
pub struct MultiVectorIndex {
    collections: DashMap<String, RwLock<Vec<IndexEntry>>>,
}

impl MultiVectorIndex {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    /// Create an empty collection. Creating an existing collection is a
    /// no-op.
    pub fn create_collection(&self, collection: &str) {
        self.collections
            .entry(collection.to_string())
            .or_insert_with(|| RwLock::new(Vec::new()));
    }

    /// Append an entry to a collection.
    ///
    /// Returns `false` when the collection does not exist (deleted while the
    /// writer was still running); the entry is dropped rather than
    /// resurrecting the collection.
    pub fn upsert(&self, collection: &str, entry: IndexEntry) -> bool {
        match self.collections.get(collection) {
            Some(entries) => {
                entries.write().expect("collection lock poisoned").push(entry);
                true
            }
            None => {
                debug!(collection = %collection, "Dropping index write for missing collection");
                false
            }
        }
    }

    /// Search a collection for the `k` entries most similar to the query
    /// vector, ordered by descending cosine similarity.
    ///
    /// A missing or deleted collection yields an empty result, not an error:
    /// a query against a still-pending or deleted document degrades
    /// gracefully.
    pub fn search(&self, collection: &str, query: &[f32], k: usize) -> Vec<(IndexEntry, f32)> {
        let Some(entries) = self.collections.get(collection) else {
            return Vec::new();
        };

        let entries = entries.read().expect("collection lock poisoned");
        let mut scored: Vec<(IndexEntry, f32)> = entries
            .iter()
            .map(|entry| (entry.clone(), cosine_similarity(query, &entry.vector)))
            .collect();
        drop(entries);

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Remove a collection and all of its entries.
    pub fn delete_collection(&self, collection: &str) -> bool {
        self.collections.remove(collection).is_some()
    }

    /// Number of entries currently stored in a collection.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|entries| entries.read().expect("collection lock poisoned").len())
            .unwrap_or(0)
    }
}

/// Calculate cosine similarity between two vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{EntryContent, UnitKind};

    fn entry(document_id: &str, unit_id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            document_id: document_id.to_string(),
            unit_id: unit_id.to_string(),
            kind: UnitKind::Text,
            surrogate: format!("surrogate for {unit_id}"),
            vector,
            content: EntryContent::Text {
                body: format!("raw content of {unit_id}"),
            },
            page: None,
            section: None,
        }
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let index = MultiVectorIndex::new();
        index.create_collection("doc-1");
        index.upsert("doc-1", entry("doc-1", "text-000", vec![1.0, 0.0]));
        index.upsert("doc-1", entry("doc-1", "text-001", vec![0.0, 1.0]));
        index.upsert("doc-1", entry("doc-1", "text-002", vec![0.7, 0.7]));

        let results = index.search("doc-1", &[1.0, 0.0], 3);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0.unit_id, "text-000");
        assert_eq!(results[1].0.unit_id, "text-002");
        assert!(results[0].1 >= results[1].1 && results[1].1 >= results[2].1);
    }

    #[test]
    fn search_respects_k() {
        let index = MultiVectorIndex::new();
        index.create_collection("doc-1");
        for i in 0..10 {
            index.upsert("doc-1", entry("doc-1", &format!("text-{i:03}"), vec![1.0, 0.0]));
        }

        assert_eq!(index.search("doc-1", &[1.0, 0.0], 4).len(), 4);
    }

    #[test]
    fn missing_collection_searches_empty() {
        let index = MultiVectorIndex::new();
        assert!(index.search("never-created", &[1.0, 0.0], 5).is_empty());

        index.create_collection("doc-1");
        index.upsert("doc-1", entry("doc-1", "text-000", vec![1.0, 0.0]));
        index.delete_collection("doc-1");
        assert!(index.search("doc-1", &[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn collections_are_isolated() {
        let index = MultiVectorIndex::new();
        index.create_collection("doc-1");
        index.create_collection("doc-2");
        index.upsert("doc-1", entry("doc-1", "text-000", vec![1.0, 0.0]));
        index.upsert("doc-2", entry("doc-2", "text-000", vec![1.0, 0.0]));

        let results = index.search("doc-1", &[1.0, 0.0], 10);
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|(e, _)| e.document_id == "doc-1"));
    }

    #[test]
    fn upsert_after_delete_is_dropped() {
        let index = MultiVectorIndex::new();
        index.create_collection("doc-1");
        index.delete_collection("doc-1");

        assert!(!index.upsert("doc-1", entry("doc-1", "text-000", vec![1.0])));
        assert!(index.search("doc-1", &[1.0], 5).is_empty());
        assert_eq!(index.collection_len("doc-1"), 0);
    }

    #[test]
    fn cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < f32::EPSILON);
    }
}
