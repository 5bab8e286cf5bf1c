//! # Errors
//!
//! Typed errors for the model client and the run archive. Orchestration code
//! (worker, crew, CLI) wraps these in `anyhow` with context.

use thiserror::Error;

/// Errors from the Ollama chat client
#[derive(Debug, Error)]
pub enum LlmError {
    /// Could not reach the server or the connection dropped
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout (seconds)
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Server answered with an error
    #[error("Ollama API error: {0}")]
    Api(String),

    /// Body could not be parsed
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub(crate) fn from_reqwest(err: reqwest::Error, base_url: &str, timeout_secs: u64) -> Self {
        if err.is_connect() {
            LlmError::Network(format!(
                "Cannot connect to Ollama at {}. Is it running? (ollama serve)",
                base_url
            ))
        } else if err.is_timeout() {
            LlmError::Timeout(timeout_secs)
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

/// Errors from reading or writing persisted runs
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Run id or file name that would escape the output root
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StateError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub(crate) fn json(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        StateError::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Whether the error means "nothing there" rather than a failure
    pub fn is_not_found(&self) -> bool {
        match self {
            StateError::NotFound(_) => true,
            StateError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
