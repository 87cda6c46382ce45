//! Ollama-backed capability provider.
//!
//! Implements surrogate generation (chat + vision models), embeddings, and
//! answer generation against a single Ollama instance. One provider covers
//! three capability traits; the embedding fingerprint ties the index to the
//! configured embedding model.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capability::{AnswerGenerator, EmbeddingProvider, SurrogateGenerator};
use crate::config::{EmbeddingsConfig, OllamaConfig};
use crate::error::{CapabilityError, EngineResult};

/// Capability provider backed by the Ollama HTTP API.
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
    embeddings: EmbeddingsConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig, embeddings: EmbeddingsConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CapabilityError::Connection {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            config,
            embeddings,
        })
    }

    /// Check if the Ollama endpoint is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    /// Run a single non-streaming chat completion.
    async fn chat(
        &self,
        model: &str,
        prompt: String,
        images: Option<Vec<String>>,
    ) -> Result<String, CapabilityError> {
        let url = format!("{}/api/chat", self.config.base_url);

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
                images,
            }],
            stream: false,
            options: ChatOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model")
                && (message.contains("not found") || message.contains("does not exist"))
            {
                return Err(CapabilityError::ModelNotFound {
                    model: model.to_string(),
                });
            }

            return Err(CapabilityError::Generation { status, message });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| CapabilityError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl SurrogateGenerator for OllamaProvider {
    async fn summarize_text(&self, text: &str) -> Result<String, CapabilityError> {
        self.chat(&self.config.chat_model, text_summary_prompt(text), None)
            .await
    }

    async fn summarize_table(&self, table: &str) -> Result<String, CapabilityError> {
        self.chat(&self.config.chat_model, table_summary_prompt(table), None)
            .await
    }

    async fn describe_image(&self, image: &[u8]) -> Result<String, CapabilityError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        self.chat(
            &self.config.vision_model,
            IMAGE_DESCRIPTION_PROMPT.to_string(),
            Some(vec![encoded]),
        )
        .await
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let url = format!("{}/api/embeddings", self.config.base_url);

        let request = EmbeddingRequest {
            model: self.embeddings.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model")
                && (message.contains("not found") || message.contains("does not exist"))
            {
                return Err(CapabilityError::ModelNotFound {
                    model: self.embeddings.model.clone(),
                });
            }

            return Err(CapabilityError::Generation { status, message });
        }

        let embedding_response: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| CapabilityError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        Ok(embedding_response.embedding)
    }

    fn fingerprint(&self) -> String {
        format!("ollama:{}", self.embeddings.model)
    }
}

#[async_trait]
impl AnswerGenerator for OllamaProvider {
    async fn generate(&self, context: &str, question: &str) -> Result<String, CapabilityError> {
        let prompt = format!(
            "You are an assistant answering questions about a document. \
            Ground every statement in the provided context; say so when the \
            context does not contain the answer.\n\n\
            CONTEXT:\n{context}\n\nQUESTION: {question}\n\nANSWER:"
        );
        self.chat(&self.config.chat_model, prompt, None).await
    }
}

fn text_summary_prompt(text: &str) -> String {
    format!(
        "Summarize the following content for a retrieval system. Preserve \
        key concepts, definitions, formulas, relationships, and the specific \
        terminology someone would use when asking questions about it.\n\n\
        Content:\n{text}\n\nSummary:"
    )
}

fn table_summary_prompt(table: &str) -> String {
    format!(
        "Summarize the following table for a retrieval system. State what \
        the table represents, its column headers, notable values, and any \
        patterns or trends in the data.\n\nTable:\n{table}\n\nSummary:"
    )
}

const IMAGE_DESCRIPTION_PROMPT: &str =
    "Describe this image in detail. Include any visible text, formulas, or \
    equations, and explain diagrams, charts, and technical concepts, so the \
    description can stand in for the image when answering questions.";

// Ollama API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    /// Base64-encoded images for vision models
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn fingerprint_identifies_embedding_model() {
        let config = EngineConfig::default();
        let provider = OllamaProvider::new(config.ollama, config.embeddings).unwrap();
        assert_eq!(provider.fingerprint(), "ollama:nomic-embed-text");
    }

    #[test]
    fn chat_request_omits_images_when_absent() {
        let request = ChatRequest {
            model: "llama3.2".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
                images: None,
            }],
            stream: false,
            options: ChatOptions { temperature: 0.3 },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("images"));
        assert!(json.contains("\"stream\":false"));
    }

    #[test]
    fn prompts_embed_the_source_content() {
        assert!(text_summary_prompt("ohm's law").contains("ohm's law"));
        assert!(table_summary_prompt("| a | b |").contains("| a | b |"));
    }
}
