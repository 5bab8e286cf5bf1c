//! # Phase Transitions
//!
//! Called once per finished task. Closes the current phase on the stream,
//! moves the phase handler on and opens the next phase.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::events::PipelineEvent;
use super::handler::PhaseHandler;
use super::pipeline::{Phase, TaskOutput};
use crate::state::artifacts::extract_code;

/// Phase state machine driven by task completions
pub struct PhaseTransition {
    queue: UnboundedSender<PipelineEvent>,
    phases: Arc<Vec<Phase>>,
    handler: Arc<PhaseHandler>,
    counter: AtomicUsize,
    content_cap: usize,
}

impl PhaseTransition {
    pub fn new(
        queue: UnboundedSender<PipelineEvent>,
        phases: Arc<Vec<Phase>>,
        handler: Arc<PhaseHandler>,
        content_cap: usize,
    ) -> Self {
        Self {
            queue,
            phases,
            handler,
            counter: AtomicUsize::new(0),
            content_cap,
        }
    }

    /// Number of phases completed so far
    pub fn completed(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Task callback; never panics
    pub fn on_task_done(&self, output: &TaskOutput) {
        let result = catch_unwind(AssertUnwindSafe(|| self.advance(output)));
        if result.is_err() {
            warn!(agent = %output.agent, "Dropped phase transition event");
        }
    }

    fn advance(&self, output: &TaskOutput) {
        let index = self.counter.load(Ordering::SeqCst);
        let Some(phase) = self.phases.get(index) else {
            debug!(index, "Task finished after the last phase");
            return;
        };

        // Pending console text goes out ahead of the phase_complete
        self.handler.flush();

        let content = if phase.extract {
            extract_code(&output.raw)
        } else {
            output.raw.clone()
        };
        self.emit(PipelineEvent::phase_complete(phase, &content, self.content_cap));

        let next = index + 1;
        self.counter.store(next, Ordering::SeqCst);
        self.handler.set_phase(next);

        if let Some(phase) = self.phases.get(next) {
            self.emit(PipelineEvent::phase_start(phase));
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.queue.send(event);
    }
}
