//! # Agent Definitions
//!
//! One agent per lifecycle role: a persona (goal + backstory) that becomes
//! the system prompt of every call the agent makes.

use crate::models::AgentRole;

/// A role persona
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub role: AgentRole,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl AgentDefinition {
    /// System prompt sent ahead of every task
    pub fn system_prompt(&self) -> String {
        format!(
            "You are the {}. {}\n\nYour goal: {}",
            self.role.display_name(),
            self.backstory,
            self.goal
        )
    }
}

/// Persona for a role
pub fn agent_for(role: AgentRole) -> AgentDefinition {
    let (goal, backstory) = match role {
        AgentRole::RequirementAnalyst => (
            "Turn a natural-language software description into a clear, structured Markdown specification.",
            "You extract functional and non-functional requirements from vague descriptions and write precise specifications.",
        ),
        AgentRole::SeniorDeveloper => (
            "Write clean, typed, documented Python that fully implements the specification.",
            "You write modular, well-documented code with proper error handling.",
        ),
        AgentRole::CodeReviewer => (
            "Review code for correctness, security, performance and edge cases; give a verdict, a score and actionable fixes.",
            "You catch bugs and design flaws and explain exactly how to fix them. A score of 7 or more means APPROVED.",
        ),
        AgentRole::QaEngineer => (
            "Write a thorough pytest suite covering public behaviour, edge cases and error paths.",
            "You test happy paths and failure paths alike, with fixtures and parametrization.",
        ),
        AgentRole::TechWriter => (
            "Produce developer documentation: README, usage, API reference, configuration and troubleshooting.",
            "You write docs that get developers productive quickly, always with examples.",
        ),
        AgentRole::DevopsAgent => (
            "Produce deployment configuration: Dockerfile, compose file, pinned requirements, CI workflow and env template.",
            "You ship non-root containers with health checks and cache-friendly layers.",
        ),
        AgentRole::UiDesigner => (
            "Build a modern Streamlit interface for the application.",
            "You design clean, intuitive Streamlit apps with clear feedback for the user.",
        ),
    };

    AgentDefinition {
        role,
        goal,
        backstory,
    }
}

/// All agents in pipeline order
pub fn create_agents() -> Vec<AgentDefinition> {
    AgentRole::all().into_iter().map(agent_for).collect()
}
