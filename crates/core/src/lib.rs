//! # SDLC Core
//!
//! Everything behind the SDLC dashboard: the agent crew, the Ollama client,
//! per-run output capture and event streaming, and persisted run state.
//!
//! ## Architecture
//!
//! - `agents/` - Role personas, prompt templates, tasks and the sequential crew
//! - `llm/` - Blocking streaming client for Ollama
//! - `console` - Process-wide console routers with per-thread capture
//! - `swarm/` - Run registry, worker threads, phase handler and events
//! - `state/` - Run directories, manifests and history reads
//! - `config` - Settings file and environment overrides
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sdlc_core::{agents::SdlcCrew, config::PipelineConfig, swarm::RunRegistry};
//! use futures::StreamExt;
//!
//! let config = PipelineConfig::load()?;
//! let crew = SdlcCrew::from_config(config.clone())?;
//! let registry = Arc::new(RunRegistry::new(Arc::new(crew), config));
//! let (run_id, mut events) = registry.start_and_stream("Build a todo CLI")?;
//! while let Some(event) = events.next().await {
//!     println!("{}", event.to_json());
//! }
//! ```

pub mod agents;
pub mod config;
pub mod console;
pub mod error;
pub mod llm;
pub mod models;
pub mod state;
pub mod swarm;

pub use error::{LlmError, StateError};
