//! # Tasks
//!
//! The seven tasks of the lifecycle, in execution order. A task names the
//! agent that runs it, its prompt template and which earlier task outputs it
//! receives as context.

use super::prompts;
use crate::models::AgentRole;
use crate::swarm::pipeline::TaskOutput;

/// Index of the specification task
pub const SPEC_TASK: usize = 0;
/// Index of the code task; its output is replaced by review revisions
pub const CODE_TASK: usize = 1;
/// Index of the review task
pub const REVIEW_TASK: usize = 2;

/// A unit of work for one agent
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub key: &'static str,
    pub role: AgentRole,
    pub template: &'static str,
    /// Earlier task indices whose outputs are passed as context
    pub context: &'static [usize],
}

impl TaskSpec {
    /// First line of the template, for banners
    pub fn title(&self) -> &'static str {
        self.template.lines().next().unwrap_or(self.key)
    }

    /// Build the user prompt from the requirement and prior outputs
    pub fn render(&self, requirement: &str, outputs: &[TaskOutput]) -> String {
        let mut prompt = self.template.trim_end().to_string();

        if self.context.is_empty() {
            prompt.push_str("\n\nUSER REQUIREMENT:\n");
            prompt.push_str(requirement);
            return prompt;
        }

        for &index in self.context {
            if let Some(output) = outputs.get(index) {
                prompt.push_str(&format!("\n\n### {} output\n{}", output.agent, output.raw));
            }
        }
        prompt
    }
}

/// The lifecycle tasks in order
pub fn sdlc_tasks() -> [TaskSpec; 7] {
    const SPEC: &[usize] = &[SPEC_TASK];
    const SPEC_AND_CODE: &[usize] = &[SPEC_TASK, CODE_TASK];

    [
        TaskSpec {
            key: "analyze",
            role: AgentRole::RequirementAnalyst,
            template: prompts::ANALYZE,
            context: &[],
        },
        TaskSpec {
            key: "develop",
            role: AgentRole::SeniorDeveloper,
            template: prompts::DEVELOP,
            context: SPEC,
        },
        TaskSpec {
            key: "review",
            role: AgentRole::CodeReviewer,
            template: prompts::REVIEW,
            context: SPEC_AND_CODE,
        },
        TaskSpec {
            key: "test",
            role: AgentRole::QaEngineer,
            template: prompts::TEST,
            context: SPEC_AND_CODE,
        },
        TaskSpec {
            key: "doc",
            role: AgentRole::TechWriter,
            template: prompts::DOCUMENT,
            context: SPEC_AND_CODE,
        },
        TaskSpec {
            key: "devops",
            role: AgentRole::DevopsAgent,
            template: prompts::DEVOPS,
            context: SPEC_AND_CODE,
        },
        TaskSpec {
            key: "ui",
            role: AgentRole::UiDesigner,
            template: prompts::UI,
            context: SPEC_AND_CODE,
        },
    ]
}
