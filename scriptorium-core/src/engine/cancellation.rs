//! Cancellation token management for in-flight pipeline runs.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::DocumentEngine;

impl DocumentEngine {
    /// Register a cancellation token for a document being processed.
    pub(crate) fn register_processing_token(&self, document_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancellation_tokens
            .insert(document_id.to_string(), token.clone());
        token
    }

    /// Cancel processing for a document if in progress.
    pub(crate) fn cancel_processing(&self, document_id: &str) -> bool {
        if let Some((_, token)) = self.cancellation_tokens.remove(document_id) {
            token.cancel();
            info!(doc_id = %document_id, "Document processing cancellation triggered");
            true
        } else {
            false
        }
    }
}
