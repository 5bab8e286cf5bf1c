use serde::{Deserialize, Serialize};

/// One message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// system, user or assistant
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Request for the Ollama chat endpoint
#[derive(Debug, Serialize)]
pub struct OllamaChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub options: OllamaOptions,
    /// Always true: tokens are forwarded as they arrive
    pub stream: bool,
}

/// Model options for Ollama
#[derive(Debug, Serialize)]
pub struct OllamaOptions {
    pub temperature: f32,
    /// Maximum number of tokens to generate
    pub num_predict: u32,
}

/// One NDJSON line of a streamed chat response
#[derive(Debug, Deserialize)]
pub struct OllamaChatChunk {
    #[serde(default)]
    pub message: Option<OllamaChunkMessage>,
    #[serde(default)]
    pub done: bool,
    /// Set when the server fails mid-stream
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaChunkMessage {
    #[serde(default)]
    pub content: String,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct OllamaError {
    pub error: String,
}

/// Response from `/api/tags`
#[derive(Debug, Deserialize)]
pub struct OllamaTagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
}
