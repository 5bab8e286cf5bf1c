//! # Run Manifest
//!
//! The persisted record of a run: `manifest.json` and `conversation_log.json`.
//! Readers tolerate missing fields so older or partial manifests still list.

use serde::{Deserialize, Serialize};

use crate::swarm::pipeline::{Phase, RunStatus};

/// Label recorded in every manifest
pub const FRAMEWORK: &str = "Rust + Ollama";

/// Phase entry of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPhase {
    pub phase_id: String,
    /// 1-based
    pub phase_number: usize,
    pub phase_name: String,
    pub agent: String,
    pub model: String,
    pub output_file: String,
}

impl From<&Phase> for ManifestPhase {
    fn from(phase: &Phase) -> Self {
        Self {
            phase_id: phase.phase_id.clone(),
            phase_number: phase.index + 1,
            phase_name: phase.phase.clone(),
            agent: phase.agent.clone(),
            model: phase.model.clone(),
            output_file: phase.file.clone(),
        }
    }
}

/// One agent exchange, summarised by size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub phase_id: String,
    pub phase: String,
    pub agent: String,
    pub model: String,
    pub input_context: String,
    pub output_length: usize,
    pub output_file: String,
}

impl ConversationEntry {
    /// Entry for a phase whose persisted content is `content`
    pub fn new(phase: &Phase, requirement: &str, content: &str) -> Self {
        let input_context = if phase.index == 0 {
            requirement.chars().take(500).collect()
        } else {
            format!("(output from phase {})", phase.index)
        };

        Self {
            phase_id: phase.phase_id.clone(),
            phase: phase.phase.clone(),
            agent: phase.agent.clone(),
            model: phase.model.clone(),
            input_context,
            output_length: content.chars().count(),
            output_file: phase.file.clone(),
        }
    }
}

/// `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub user_requirement: String,
    #[serde(default = "completed")]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub phases: Vec<ManifestPhase>,
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
}

fn completed() -> RunStatus {
    RunStatus::Completed
}

/// `conversation_log.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    pub run_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub conversations: Vec<ConversationEntry>,
}

/// History list row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: String,
    pub elapsed: f64,
    /// First 120 chars of the requirement
    pub requirement: String,
    pub status: RunStatus,
    pub phases_count: usize,
}

impl From<&RunManifest> for RunSummary {
    fn from(m: &RunManifest) -> Self {
        Self {
            run_id: m.run_id.clone(),
            timestamp: m.timestamp.clone(),
            elapsed: m.elapsed_seconds,
            requirement: m.user_requirement.chars().take(120).collect(),
            status: m.status,
            phases_count: m.phases.len(),
        }
    }
}
