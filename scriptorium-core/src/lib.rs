//! Multi-modal document ingestion, multi-vector retrieval, and grounded
//! question answering.
//!
//! Documents are partitioned into typed content units (text, tables,
//! images), each unit gets a compact semantic surrogate, and surrogates are
//! embedded into a per-document vector collection. Questions are answered by
//! ranking in surrogate space while grounding the generation prompt in the
//! original content, so every retrieved hit resolves back to its exact
//! source unit. [`engine::DocumentEngine`] is the boundary a transport layer
//! builds on: upload, status, subscribe, query, delete.

/// Capability traits for extraction, summarization, embedding, and answers.
pub mod capability;
/// Engine configuration with file/environment loading.
pub mod config;
/// Shared data model: documents, content units, index entries, snapshots.
pub mod document;
/// Engine facade exposed to callers.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Built-in Markdown/plain-text extraction.
pub mod extract;
/// Multi-vector retrieval index.
pub mod index;
/// Document processing pipeline.
pub mod pipeline;
/// Bundled capability providers.
pub mod providers;
/// Grounded question answering.
pub mod query;
/// Document state registry and status fan-out.
pub mod registry;

pub use crate::config::EngineConfig;
pub use crate::document::{Document, DocumentStatus, StatusSnapshot};
pub use crate::engine::DocumentEngine;
pub use crate::error::{EngineError, EngineResult};
pub use crate::query::DocumentAnswer;
