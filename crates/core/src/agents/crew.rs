//! # SDLC Crew
//!
//! Runs the seven lifecycle tasks sequentially against a chat backend.
//! Progress banners and streamed model tokens are written to a console
//! router, so a run thread registered with the router sees its own agents
//! talking.
//!
//! The review task loops: while the reviewer does not approve and rounds
//! remain, the developer revises the code and the reviewer looks again.

use anyhow::Context;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::definitions::agent_for;
use super::prompts;
use super::tasks::{sdlc_tasks, CODE_TASK, REVIEW_TASK};
use crate::config::PipelineConfig;
use crate::console::{self, OutputRouter};
use crate::llm::{ChatBackend, ChatMessage, OllamaClient};
use crate::models::AgentRole;
use crate::swarm::pipeline::{AgentPipeline, CrewOutput, TaskCallback, TaskOutput};

const BANNER_WIDTH: usize = 60;

/// The lifecycle crew
pub struct SdlcCrew {
    backend: Arc<dyn ChatBackend>,
    config: PipelineConfig,
    console: &'static OutputRouter,
}

impl SdlcCrew {
    pub fn new(backend: Arc<dyn ChatBackend>, config: PipelineConfig) -> Self {
        Self {
            backend,
            config,
            console: console::stdout(),
        }
    }

    /// Crew backed by an Ollama client built from the config
    pub fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let client = OllamaClient::from_config(&config)
            .context("Failed to create Ollama client")?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// Write progress to a different router
    pub fn with_console(mut self, console: &'static OutputRouter) -> Self {
        self.console = console;
        self
    }

    /// Run one agent call, streaming tokens to the console
    fn execute(&self, role: AgentRole, title: &str, prompt: &str) -> anyhow::Result<String> {
        let agent = agent_for(role);
        let model = self.config.model_config(role);

        self.console.write(&banner("Agent Started", &[
            format!("Agent: {}", role.display_name()),
            format!("Task: {}", title),
        ]));

        let messages = [
            ChatMessage::system(agent.system_prompt()),
            ChatMessage::user(prompt),
        ];

        let started = Instant::now();
        let output = self
            .backend
            .chat(&model, &messages, &mut |token: &str| {
                self.console.write(token);
            })
            .with_context(|| format!("{} failed on '{}'", role.display_name(), title))?;

        self.console.write(&format!(
            "\n\n## Final Answer ({}): {} chars\n",
            role.display_name(),
            output.chars().count()
        ));
        info!(
            agent = role.display_name(),
            model = %model.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = output.len(),
            "Task finished"
        );

        Ok(output)
    }

    /// Revise and re-review until approved or out of rounds; returns the final review
    fn review_until_approved(
        &self,
        outputs: &mut [TaskOutput],
        mut review: String,
    ) -> anyhow::Result<String> {
        let max = self.config.review_max_iterations.max(1);
        let review_task = sdlc_tasks()[REVIEW_TASK];

        for iteration in 1..=max {
            if is_approved(&review) {
                info!(iteration, "Code review approved");
                return Ok(review);
            }
            if iteration == max {
                break;
            }

            info!(iteration, max, "Code review requested changes, revising");
            let revise_prompt = format!(
                "{}\n\n### Code Reviewer output\n{}\n\n### Current code\n{}",
                prompts::REVISE.trim_end(),
                review,
                outputs[CODE_TASK].raw
            );
            outputs[CODE_TASK].raw =
                self.execute(AgentRole::SeniorDeveloper, "Revise code", &revise_prompt)?;

            let prompt = review_task.render("", outputs);
            review = self.execute(review_task.role, review_task.title(), &prompt)?;
        }

        warn!(max, "Review rounds exhausted, keeping last review");
        Ok(review)
    }
}

impl AgentPipeline for SdlcCrew {
    #[instrument(
        skip_all,
        fields(requirement_preview = %requirement.chars().take(60).collect::<String>())
    )]
    fn kickoff(
        &self,
        requirement: &str,
        on_task_done: TaskCallback<'_>,
    ) -> anyhow::Result<CrewOutput> {
        let tasks = sdlc_tasks();
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(tasks.len());

        info!(tasks = tasks.len(), "Crew kickoff");

        for (index, task) in tasks.iter().enumerate() {
            let prompt = task.render(requirement, &outputs);
            let mut raw = self.execute(task.role, task.title(), &prompt)?;

            if index == REVIEW_TASK {
                raw = self.review_until_approved(&mut outputs, raw)?;
            }

            let output = TaskOutput::new(raw, task.role.display_name());
            on_task_done(&output);
            outputs.push(output);
        }

        self.console.write(&banner("Crew Execution Completed", &[format!(
            "Tasks: {}",
            outputs.len()
        )]));

        Ok(CrewOutput {
            tasks_output: outputs,
        })
    }

    fn model_for(&self, role: AgentRole) -> String {
        self.config.model_config(role).model
    }
}

/// Whether a review approves the code: an `APPROVED` verdict without
/// `NEEDS_REVISION`, or a score of 7 or more.
pub fn is_approved(review: &str) -> bool {
    static SCORE: OnceLock<Option<Regex>> = OnceLock::new();

    let upper = review.to_uppercase();
    if upper.contains("APPROVED") && !upper.contains("NEEDS_REVISION") {
        return true;
    }

    SCORE
        .get_or_init(|| Regex::new(r"(?i)score[:\s]*(\d+)").ok())
        .as_ref()
        .and_then(|re| re.captures(review))
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .is_some_and(|score| score >= 7)
}

fn banner(title: &str, lines: &[String]) -> String {
    let inner = BANNER_WIDTH - 2;
    let mut out = format!("\n╭─ {} {}╮\n", title, "─".repeat(inner.saturating_sub(title.chars().count() + 3)));
    for line in lines {
        let pad = inner.saturating_sub(line.chars().count() + 2);
        out.push_str(&format!("│  {}{}│\n", line, " ".repeat(pad)));
    }
    out.push_str(&format!("╰{}╯\n", "─".repeat(inner)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::models::ModelConfig;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a script, records which models were asked
    struct Scripted {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ChatBackend for Scripted {
        fn chat(
            &self,
            config: &ModelConfig,
            messages: &[ChatMessage],
            on_token: &mut dyn FnMut(&str),
        ) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((config.model.clone(), messages[1].content.clone()));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Api("script exhausted".into()))?;
            on_token(&reply);
            Ok(reply)
        }
    }

    fn crew(backend: Arc<Scripted>) -> SdlcCrew {
        let consoles = console::leaked_sink_consoles();
        SdlcCrew::new(backend, PipelineConfig::default()).with_console(consoles.stdout)
    }

    #[test]
    fn test_is_approved() {
        assert!(is_approved("Verdict: APPROVED\nScore: 6"));
        assert!(is_approved("verdict approved"));
        assert!(!is_approved("Verdict: NEEDS_REVISION (not APPROVED)\nScore: 4"));
        assert!(is_approved("NEEDS_REVISION\nscore: 8"));
        assert!(is_approved("Score 10/10"));
        assert!(!is_approved("Score: 6. Please fix the parser."));
        assert!(!is_approved(""));
    }

    #[test]
    fn test_kickoff_runs_all_tasks_in_order() {
        let backend = Scripted::new(&[
            "spec", "code", "APPROVED", "tests", "docs", "devops", "ui",
        ]);
        let crew = crew(backend.clone());

        let seen = Mutex::new(Vec::new());
        let result = crew
            .kickoff("Build a todo CLI", &|out: &TaskOutput| {
                seen.lock().unwrap().push(out.agent.clone())
            })
            .unwrap();

        let raws: Vec<&str> = result.tasks_output.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["spec", "code", "APPROVED", "tests", "docs", "devops", "ui"]);
        assert_eq!(seen.lock().unwrap()[6], "UI Designer");

        let calls = backend.calls();
        assert_eq!(calls.len(), 7);
        assert!(calls[0].1.contains("Build a todo CLI"));
        assert_eq!(calls[1].0, "qwen3-coder:30b");
        assert!(calls[3].1.contains("### Senior Developer output\ncode"));
    }

    #[test]
    fn test_review_loop_revises_code() {
        let backend = Scripted::new(&[
            "spec",
            "code v1",
            "NEEDS_REVISION score: 3",
            "code v2",
            "Score: 9",
            "tests",
            "docs",
            "devops",
            "ui",
        ]);
        let crew = crew(backend.clone());

        let callbacks = Mutex::new(0usize);
        let result = crew
            .kickoff("req", &|_: &TaskOutput| *callbacks.lock().unwrap() += 1)
            .unwrap();

        assert_eq!(*callbacks.lock().unwrap(), 7);
        assert_eq!(result.tasks_output[CODE_TASK].raw, "code v2");
        assert_eq!(result.tasks_output[REVIEW_TASK].raw, "Score: 9");

        let calls = backend.calls();
        assert!(calls[3].1.contains("NEEDS_REVISION score: 3"));
        assert!(calls[4].1.contains("code v2"));
        assert!(calls[5].1.contains("code v2"));
    }

    #[test]
    fn test_review_rounds_are_bounded() {
        let backend = Scripted::new(&[
            "spec", "c1", "NEEDS_REVISION", "c2", "NEEDS_REVISION", "c3", "NEEDS_REVISION",
            "tests", "docs", "devops", "ui",
        ]);
        let crew = crew(backend.clone());

        let result = crew.kickoff("req", &|_: &TaskOutput| {}).unwrap();

        assert_eq!(backend.calls().len(), 11);
        assert_eq!(result.tasks_output[CODE_TASK].raw, "c3");
    }

    #[test]
    fn test_backend_failure_stops_kickoff() {
        let backend = Scripted::new(&["spec", "code"]);
        let crew = crew(backend);

        let done = Mutex::new(0usize);
        let err = crew
            .kickoff("req", &|_: &TaskOutput| *done.lock().unwrap() += 1)
            .unwrap_err();

        assert_eq!(*done.lock().unwrap(), 2);
        assert!(format!("{:#}", err).contains("Code Reviewer failed"));
    }

    #[test]
    fn test_banner_shape() {
        let text = banner("Agent Started", &["Agent: QA Engineer".to_string()]);
        assert!(text.contains("╭─ Agent Started"));
        assert!(text.contains("│  Agent: QA Engineer"));
        assert!(text.trim_end().ends_with('╯'));
    }
}
