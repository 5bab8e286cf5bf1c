//! # Pipeline Events
//!
//! Everything a run reports to its stream. Serialized with an `event` tag,
//! one JSON object per SSE message.

use serde::{Deserialize, Serialize};

use super::pipeline::Phase;

/// Phase as announced in `pipeline_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase_id: String,
    pub phase: String,
    pub agent: String,
    pub icon: String,
    pub color: String,
}

impl From<&Phase> for PhaseSummary {
    fn from(phase: &Phase) -> Self {
        Self {
            phase_id: phase.phase_id.clone(),
            phase: phase.phase.clone(),
            agent: phase.agent.clone(),
            icon: phase.icon.clone(),
            color: phase.color.clone(),
        }
    }
}

/// An event on a run's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStart {
        run_id: String,
        timestamp: String,
        requirement: String,
        phases: Vec<PhaseSummary>,
    },
    Status {
        message: String,
    },
    PhaseStart {
        phase_index: usize,
        phase_id: String,
        phase: String,
        agent: String,
        model: String,
        icon: String,
        color: String,
    },
    /// Coalesced console text of the current phase
    AgentOutput {
        phase_index: usize,
        text: String,
    },
    PhaseComplete {
        phase_index: usize,
        phase_id: String,
        phase: String,
        agent: String,
        /// Leading part of the content only
        content: String,
        /// Length of the untruncated content, in chars
        content_length: usize,
        file: String,
    },
    PipelineComplete {
        run_id: String,
        elapsed_seconds: f64,
        elapsed_display: String,
        files_count: usize,
    },
    Error {
        message: String,
    },
    /// Last event of every stream
    Done,
    /// Sent when the stream has been idle
    Heartbeat,
}

impl PipelineEvent {
    pub fn status(message: impl Into<String>) -> Self {
        PipelineEvent::Status {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PipelineEvent::Error {
            message: message.into(),
        }
    }

    pub fn phase_start(phase: &Phase) -> Self {
        PipelineEvent::PhaseStart {
            phase_index: phase.index,
            phase_id: phase.phase_id.clone(),
            phase: phase.phase.clone(),
            agent: phase.agent.clone(),
            model: phase.model.clone(),
            icon: phase.icon.clone(),
            color: phase.color.clone(),
        }
    }

    /// `phase_complete` keeping the first `cap` chars of `content`
    pub fn phase_complete(phase: &Phase, content: &str, cap: usize) -> Self {
        PipelineEvent::PhaseComplete {
            phase_index: phase.index,
            phase_id: phase.phase_id.clone(),
            phase: phase.phase.clone(),
            agent: phase.agent.clone(),
            content: truncate_head(content, cap).to_string(),
            content_length: content.chars().count(),
            file: phase.file.clone(),
        }
    }

    /// `pipeline_complete` with elapsed time rounded to a tenth of a second
    pub fn pipeline_complete(run_id: &str, elapsed_secs: f64, files_count: usize) -> Self {
        PipelineEvent::PipelineComplete {
            run_id: run_id.to_string(),
            elapsed_seconds: round_tenths(elapsed_secs),
            elapsed_display: format!("{:.1} min", elapsed_secs / 60.0),
            files_count,
        }
    }

    /// Wire name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::PipelineStart { .. } => "pipeline_start",
            PipelineEvent::Status { .. } => "status",
            PipelineEvent::PhaseStart { .. } => "phase_start",
            PipelineEvent::AgentOutput { .. } => "agent_output",
            PipelineEvent::PhaseComplete { .. } => "phase_complete",
            PipelineEvent::PipelineComplete { .. } => "pipeline_complete",
            PipelineEvent::Error { .. } => "error",
            PipelineEvent::Done => "done",
            PipelineEvent::Heartbeat => "heartbeat",
        }
    }

    /// Whether the stream ends after this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Done)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"event":"{}"}}"#, self.kind()))
    }
}

pub(crate) fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The last `max` chars of `text`
pub(crate) fn keep_tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    match text.char_indices().nth(count - max) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}

/// The first `max` chars of `text`
pub(crate) fn truncate_head(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
