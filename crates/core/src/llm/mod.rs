//! # LLM Client
//!
//! Blocking, streaming client for a local Ollama server. Agents run on
//! their own OS thread, so calls block that thread and push each token to a
//! callback as it arrives.

pub mod client;
pub mod types;

pub use client::{ChatBackend, OllamaClient};
pub use types::ChatMessage;
