//! # Models
//!
//! Agent roles and their model configuration. Every role talks to the same
//! Ollama server; roles differ in which local model they use and at which
//! temperature.

use serde::{Deserialize, Serialize};

/// Planner model: reasoning, planning, writing
pub const PLANNER_MODEL: &str = "gpt-oss:20b";
/// Coder model: code and test generation
pub const CODER_MODEL: &str = "qwen3-coder:30b";
/// Reviewer model: code review
pub const REVIEWER_MODEL: &str = "devstral-small-2:24b";

/// Default Ollama API URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// The seven lifecycle roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    RequirementAnalyst,
    SeniorDeveloper,
    CodeReviewer,
    QaEngineer,
    TechWriter,
    DevopsAgent,
    UiDesigner,
}

impl AgentRole {
    /// All roles in pipeline order
    pub fn all() -> [AgentRole; 7] {
        [
            AgentRole::RequirementAnalyst,
            AgentRole::SeniorDeveloper,
            AgentRole::CodeReviewer,
            AgentRole::QaEngineer,
            AgentRole::TechWriter,
            AgentRole::DevopsAgent,
            AgentRole::UiDesigner,
        ]
    }

    /// Config key, also the serde name
    pub fn key(&self) -> &'static str {
        match self {
            AgentRole::RequirementAnalyst => "requirement_analyst",
            AgentRole::SeniorDeveloper => "senior_developer",
            AgentRole::CodeReviewer => "code_reviewer",
            AgentRole::QaEngineer => "qa_engineer",
            AgentRole::TechWriter => "tech_writer",
            AgentRole::DevopsAgent => "devops_agent",
            AgentRole::UiDesigner => "ui_designer",
        }
    }

    /// Display name for UI and events
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::RequirementAnalyst => "Requirement Analyst",
            AgentRole::SeniorDeveloper => "Senior Developer",
            AgentRole::CodeReviewer => "Code Reviewer",
            AgentRole::QaEngineer => "QA Engineer",
            AgentRole::TechWriter => "Tech Writer",
            AgentRole::DevopsAgent => "DevOps Agent",
            AgentRole::UiDesigner => "UI Designer",
        }
    }

    /// Look a role up by config key
    pub fn from_key(key: &str) -> Option<AgentRole> {
        AgentRole::all().into_iter().find(|r| r.key() == key)
    }

    /// Model used when the config has no override
    pub fn default_model(&self) -> &'static str {
        match self {
            AgentRole::SeniorDeveloper | AgentRole::QaEngineer => CODER_MODEL,
            AgentRole::CodeReviewer => REVIEWER_MODEL,
            _ => PLANNER_MODEL,
        }
    }

    /// Sampling temperature used when the config has no override
    pub fn default_temperature(&self) -> f32 {
        match self {
            AgentRole::SeniorDeveloper | AgentRole::QaEngineer => 0.2,
            _ => 0.3,
        }
    }
}

/// Model selection for one agent call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Ollama model tag (e.g. "qwen3-coder:30b")
    pub model: String,
    /// Ollama server URL
    pub base_url: String,
    pub temperature: f32,
    /// Upper bound on generated tokens (`num_predict`)
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: PLANNER_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.3,
            max_tokens: 8192,
        }
    }
}

impl ModelConfig {
    /// Default config for a model tag
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Defaults for a role
    pub fn for_role(role: AgentRole) -> Self {
        Self {
            model: role.default_model().to_string(),
            temperature: role.default_temperature(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
