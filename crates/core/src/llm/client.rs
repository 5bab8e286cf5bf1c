use reqwest::blocking::Client;
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use super::types::{
    ChatMessage, OllamaChatChunk, OllamaChatRequest, OllamaError, OllamaOptions,
    OllamaTagsResponse,
};
use crate::error::LlmError;
use crate::models::ModelConfig;

/// Something that can run a chat completion, streaming tokens to a callback
pub trait ChatBackend: Send + Sync {
    /// Run one completion and return the full assistant text
    fn chat(
        &self,
        config: &ModelConfig,
        messages: &[ChatMessage],
        on_token: &mut dyn FnMut(&str),
    ) -> Result<String, LlmError>;
}

/// Ollama `/api/chat` client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client for a server URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Create from pipeline settings
    pub fn from_config(config: &crate::config::PipelineConfig) -> Result<Self, LlmError> {
        Self::new(config.ollama_base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server answers at all
    pub fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// List installed model tags
    pub fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(30))
            .send()
            .map_err(|e| self.map_err(e))?;

        if !response.status().is_success() {
            return Err(LlmError::Api(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let tags: OllamaTagsResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn map_err(&self, err: reqwest::Error) -> LlmError {
        LlmError::from_reqwest(err, &self.base_url, self.timeout.as_secs())
    }
}

impl ChatBackend for OllamaClient {
    #[instrument(skip(self, messages, on_token), fields(model = %config.model))]
    fn chat(
        &self,
        config: &ModelConfig,
        messages: &[ChatMessage],
        on_token: &mut dyn FnMut(&str),
    ) -> Result<String, LlmError> {
        let request = OllamaChatRequest {
            model: &config.model,
            messages,
            options: OllamaOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
            stream: true,
        };

        debug!("Sending request to Ollama");
        let started = Instant::now();

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| self.map_err(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                return Err(LlmError::Api(error.error));
            }
            let preview: String = body.chars().take(500).collect();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, preview)));
        }

        let content = read_chat_stream(BufReader::new(response), on_token)?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = content.len(),
            "Ollama response complete"
        );
        Ok(content)
    }
}

/// Accumulate an NDJSON chat stream, forwarding each content fragment
pub fn read_chat_stream<R: BufRead>(
    reader: R,
    on_token: &mut dyn FnMut(&str),
) -> Result<String, LlmError> {
    let mut content = String::new();

    for line in reader.lines() {
        let line = line.map_err(|e| LlmError::Network(format!("stream interrupted: {}", e)))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let chunk: OllamaChatChunk = serde_json::from_str(line)
            .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, line)))?;

        if let Some(error) = chunk.error {
            return Err(LlmError::Api(error));
        }
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                on_token(&message.content);
                content.push_str(&message.content);
            }
        }
        if chunk.done {
            break;
        }
    }

    Ok(content)
}
