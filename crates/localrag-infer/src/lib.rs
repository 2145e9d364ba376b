//! Ollama HTTP client behind the `localrag_core::traits::InferenceClient` port.
//!
//! Endpoints used:
//! - POST /api/chat - single-shot and NDJSON-streamed chat completion
//! - GET /api/tags - installed models

pub mod client;
pub mod wire;

pub use client::OllamaClient;
