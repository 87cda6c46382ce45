//! Bundled capability provider implementations.
//!
//! The core depends only on the traits in [`crate::capability`]; everything
//! that knows a concrete model endpoint lives here.

mod ollama;

pub use ollama::OllamaProvider;
