//! Capability interfaces consumed by the pipeline and query engine.
//!
//! Each trait is an independently substitutable boundary: the core never
//! names a concrete provider. The bundled Ollama-backed implementation lives
//! in [`crate::providers`].

use async_trait::async_trait;

use crate::document::ContentUnit;
use crate::error::{CapabilityError, ExtractionError};

/// Splits raw document bytes into an ordered sequence of typed content units.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<Vec<ContentUnit>, ExtractionError>;
}

/// Produces a short textual surrogate for a content unit: a summary for text
/// and tables, a description for images.
#[async_trait]
pub trait SurrogateGenerator: Send + Sync {
    async fn summarize_text(&self, text: &str) -> Result<String, CapabilityError>;

    async fn summarize_table(&self, table: &str) -> Result<String, CapabilityError>;

    async fn describe_image(&self, image: &[u8]) -> Result<String, CapabilityError>;
}

/// Maps surrogate text to a fixed-length vector.
///
/// The same provider instance/configuration must be used at index time and
/// query time for a given document; [`EmbeddingProvider::fingerprint`]
/// identifies the embedding space so that mismatches can be rejected instead
/// of silently tolerated.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;

    /// Stable identifier for the embedding space (provider + model).
    fn fingerprint(&self) -> String;
}

/// Generates an answer grounded in retrieved document content.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, context: &str, question: &str) -> Result<String, CapabilityError>;
}
