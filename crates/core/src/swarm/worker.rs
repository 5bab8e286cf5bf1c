//! # Pipeline Worker
//!
//! Body of a run's thread. Registers the run's phase handler with the
//! console routers, drives the agent pipeline, persists what it produced and
//! reports everything on the run's queue.
//!
//! Whatever happens in the body, the thread ends by unregistering from the
//! routers, then removing the registry entry, then pushing `done`.

use anyhow::Context;
use chrono::Utc;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::callback::PhaseTransition;
use super::events::{round_tenths, PhaseSummary, PipelineEvent};
use super::handler::{FlushPolicy, PhaseHandler};
use super::pipeline::{build_phases, Phase, RunStatus, TaskOutput};
use super::registry::RunRegistry;
use crate::state::artifacts::{extract_code, not_generated, RunArchive};
use crate::state::io::resolve_output_root;
use crate::state::manifest::{
    ConversationEntry, ConversationLog, ManifestPhase, RunManifest, FRAMEWORK,
};

/// Everything a worker thread owns
pub(crate) struct RunJob {
    pub run_id: String,
    pub requirement: String,
    pub queue: UnboundedSender<PipelineEvent>,
    pub registry: Arc<RunRegistry>,
}

impl RunJob {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.queue.send(event);
    }
}

/// Fixed facts of a run, shared by the success and failure paths
struct RunInfo {
    timestamp: String,
    started: Instant,
    phases: Arc<Vec<Phase>>,
}

impl RunInfo {
    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn manifest(
        &self,
        job: &RunJob,
        status: RunStatus,
        error: Option<String>,
        conversations: Vec<ConversationEntry>,
    ) -> RunManifest {
        RunManifest {
            run_id: job.run_id.clone(),
            timestamp: self.timestamp.clone(),
            elapsed_seconds: round_tenths(self.elapsed_secs()),
            framework: FRAMEWORK.to_string(),
            user_requirement: job.requirement.clone(),
            status,
            error,
            phases: self.phases.iter().map(ManifestPhase::from).collect(),
            conversations,
        }
    }
}

/// Thread entry point
pub(crate) fn run(job: RunJob) {
    let thread_id = thread::current().id();
    let registry = Arc::clone(&job.registry);
    let consoles = registry.consoles();

    let mut info = RunInfo {
        timestamp: Utc::now().to_rfc3339(),
        started: Instant::now(),
        phases: Arc::new(Vec::new()),
    };

    // Phases ask the pipeline for models, so they are built under the guard too
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        info.phases = Arc::new(build_phases(|role| registry.pipeline().model_for(role)));
        execute(&job, &info, thread_id)
    }));
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(panic) => Some(panic_message(panic.as_ref())),
    };

    if let Some(message) = &failure {
        consoles.stderr.passthrough(&format!(
            "[sdlc] run {} failed: {}\n",
            job.run_id, message
        ));
    }

    // Flushes pending output before the error goes out
    consoles.unregister(thread_id);

    let status = match failure {
        Some(message) => {
            job.emit(PipelineEvent::error(message.clone()));
            write_failed_manifest(&job, &info, message);
            RunStatus::Failed
        }
        None => RunStatus::Completed,
    };

    registry.remove(&job.run_id);
    job.emit(PipelineEvent::Done);

    info!(
        run_id = %job.run_id,
        status = status.as_str(),
        elapsed_secs = round_tenths(info.elapsed_secs()),
        "Run finished"
    );
}

fn execute(job: &RunJob, info: &RunInfo, thread_id: ThreadId) -> anyhow::Result<()> {
    let registry = &job.registry;
    let config = registry.config();
    let consoles = registry.consoles();

    let root = resolve_output_root(&config.output_dir);
    let archive = RunArchive::create(&root, &job.run_id)
        .context("Failed to create run directory")?;

    let handler = Arc::new(PhaseHandler::new(
        job.queue.clone(),
        FlushPolicy::from(&config.stream),
    ));
    consoles.register(thread_id, handler.clone());

    job.emit(PipelineEvent::PipelineStart {
        run_id: job.run_id.clone(),
        timestamp: info.timestamp.clone(),
        requirement: job.requirement.clone(),
        phases: info.phases.iter().map(PhaseSummary::from).collect(),
    });
    job.emit(PipelineEvent::status("Building agents and tasks..."));
    job.emit(PipelineEvent::status("Crew assembled — starting pipeline..."));
    if let Some(first) = info.phases.first() {
        job.emit(PipelineEvent::phase_start(first));
    }

    let transition = PhaseTransition::new(
        job.queue.clone(),
        Arc::clone(&info.phases),
        handler,
        config.stream.content_cap_chars,
    );
    let output = registry
        .pipeline()
        .kickoff(&job.requirement, &|task: &TaskOutput| transition.on_task_done(task))
        .context("Pipeline failed")?;

    consoles.unregister(thread_id);

    let conversations = save_phases(&archive, &job.requirement, &info.phases, &output.tasks_output)?;
    let manifest = info.manifest(job, RunStatus::Completed, None, conversations.clone());
    archive.write_manifest(&manifest)?;
    archive.write_conversation_log(&ConversationLog {
        run_id: job.run_id.clone(),
        timestamp: info.timestamp.clone(),
        conversations,
    })?;

    let files_count = archive.file_count()?;
    job.emit(PipelineEvent::pipeline_complete(
        &job.run_id,
        info.elapsed_secs(),
        files_count,
    ));
    Ok(())
}

/// Write one file per phase; returns the conversation entries
fn save_phases(
    archive: &RunArchive,
    requirement: &str,
    phases: &[Phase],
    outputs: &[TaskOutput],
) -> anyhow::Result<Vec<ConversationEntry>> {
    let mut conversations = Vec::with_capacity(phases.len());

    for (i, phase) in phases.iter().enumerate() {
        let content = match outputs.get(i) {
            Some(output) if phase.extract => extract_code(&output.raw),
            Some(output) => output.raw.clone(),
            None => not_generated(&phase.key),
        };

        archive
            .save_artifact(&phase.file, &content, &phase.phase_id)
            .with_context(|| format!("Failed to save {}", phase.file))?;
        conversations.push(ConversationEntry::new(phase, requirement, &content));
    }

    Ok(conversations)
}

fn write_failed_manifest(job: &RunJob, info: &RunInfo, message: String) {
    let root = resolve_output_root(&job.registry.config().output_dir);
    let written = RunArchive::create(&root, &job.run_id).and_then(|archive| {
        archive.write_manifest(&info.manifest(job, RunStatus::Failed, Some(message), Vec::new()))
    });

    if let Err(e) = written {
        warn!(run_id = %job.run_id, error = %e, "Could not record failed run");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: unknown cause".to_string()
    }
}
