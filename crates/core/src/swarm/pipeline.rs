//! # Pipeline Phases
//!
//! The fixed sequence of lifecycle phases, the per-run `Phase` records built
//! from it, and the contract of the agent pipeline that executes them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AgentRole;

/// Static definition of one phase
#[derive(Debug, Clone, Copy)]
pub struct PhaseDef {
    pub key: &'static str,
    /// Artifact file name inside the run directory
    pub file: &'static str,
    /// Whether fenced code blocks are extracted from the raw output
    pub extract: bool,
    pub phase: &'static str,
    pub role: AgentRole,
    pub icon: &'static str,
    pub color: &'static str,
}

/// The phases, in execution order
pub const PHASE_DEFS: [PhaseDef; 7] = [
    PhaseDef {
        key: "specification",
        file: "01_specification.md",
        extract: false,
        phase: "requirement_analysis",
        role: AgentRole::RequirementAnalyst,
        icon: "fa-clipboard-list",
        color: "#6366f1",
    },
    PhaseDef {
        key: "code",
        file: "02_code.py",
        extract: true,
        phase: "code_generation",
        role: AgentRole::SeniorDeveloper,
        icon: "fa-code",
        color: "#8b5cf6",
    },
    PhaseDef {
        key: "review",
        file: "03_review.md",
        extract: false,
        phase: "code_review",
        role: AgentRole::CodeReviewer,
        icon: "fa-magnifying-glass-chart",
        color: "#a855f7",
    },
    PhaseDef {
        key: "tests",
        file: "04_tests.py",
        extract: true,
        phase: "test_generation",
        role: AgentRole::QaEngineer,
        icon: "fa-flask-vial",
        color: "#d946ef",
    },
    PhaseDef {
        key: "documentation",
        file: "05_documentation.md",
        extract: false,
        phase: "documentation",
        role: AgentRole::TechWriter,
        icon: "fa-book",
        color: "#ec4899",
    },
    PhaseDef {
        key: "devops_config",
        file: "06_devops.md",
        extract: false,
        phase: "devops_configuration",
        role: AgentRole::DevopsAgent,
        icon: "fa-gears",
        color: "#f43f5e",
    },
    PhaseDef {
        key: "ui_code",
        file: "07_ui_app.py",
        extract: true,
        phase: "ui_design",
        role: AgentRole::UiDesigner,
        icon: "fa-palette",
        color: "#f97316",
    },
];

/// One phase of a specific run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub index: usize,
    pub phase_id: String,
    pub key: String,
    pub phase: String,
    pub agent: String,
    pub model: String,
    pub file: String,
    pub extract: bool,
    pub icon: String,
    pub color: String,
}

impl Phase {
    /// Instantiate a definition with a fresh UUID
    pub fn from_def(index: usize, def: &PhaseDef, model: impl Into<String>) -> Self {
        Self {
            index,
            phase_id: Uuid::new_v4().to_string(),
            key: def.key.to_string(),
            phase: def.phase.to_string(),
            agent: def.role.display_name().to_string(),
            model: model.into(),
            file: def.file.to_string(),
            extract: def.extract,
            icon: def.icon.to_string(),
            color: def.color.to_string(),
        }
    }
}

/// Build the phases for a new run, asking `model_for` which model each role uses
pub fn build_phases(model_for: impl Fn(AgentRole) -> String) -> Vec<Phase> {
    PHASE_DEFS
        .iter()
        .enumerate()
        .map(|(index, def)| Phase::from_def(index, def, model_for(def.role)))
        .collect()
}

/// Raw output of one finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub raw: String,
    /// Display name of the agent that produced it
    pub agent: String,
}

impl TaskOutput {
    pub fn new(raw: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            agent: agent.into(),
        }
    }
}

/// Result of a full crew run
#[derive(Debug, Clone, Default)]
pub struct CrewOutput {
    pub tasks_output: Vec<TaskOutput>,
}

/// Task-completion callback; may be invoked from any thread
pub type TaskCallback<'a> = &'a (dyn Fn(&TaskOutput) + Sync);

/// The agent pipeline a run drives.
///
/// `kickoff` blocks the calling thread until every task is done, invoking
/// `on_task_done` once per finished task, in task order.
pub trait AgentPipeline: Send + Sync {
    fn kickoff(&self, requirement: &str, on_task_done: TaskCallback<'_>)
        -> anyhow::Result<CrewOutput>;

    /// Model tag a role runs on
    fn model_for(&self, role: AgentRole) -> String;
}

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_table_matches_roles() {
        let roles: Vec<AgentRole> = PHASE_DEFS.iter().map(|d| d.role).collect();
        assert_eq!(roles, AgentRole::all().to_vec());

        let extracted: Vec<&str> = PHASE_DEFS
            .iter()
            .filter(|d| d.extract)
            .map(|d| d.file)
            .collect();
        assert_eq!(extracted, vec!["02_code.py", "04_tests.py", "07_ui_app.py"]);
    }

    #[test]
    fn test_build_phases_assigns_unique_ids() {
        let phases = build_phases(|role| role.default_model().to_string());

        assert_eq!(phases.len(), 7);
        assert_eq!(phases[1].agent, "Senior Developer");
        assert_eq!(phases[1].model, "qwen3-coder:30b");
        assert_eq!(phases[6].index, 6);

        let mut ids: Vec<&str> = phases.iter().map(|p| p.phase_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn test_run_status() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(RunStatus::default(), RunStatus::Running);
    }
}
