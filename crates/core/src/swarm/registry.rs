//! # Run Registry
//!
//! Maps run ids to their event queues for as long as the run is active.
//! Starting a run spawns its worker thread and returns at once; streaming a
//! run drains its queue, inserting heartbeats while it is idle.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::info;
use uuid::Uuid;

use super::events::PipelineEvent;
use super::pipeline::AgentPipeline;
use super::worker::{self, RunJob};
use crate::config::PipelineConfig;
use crate::console::Consoles;

/// Stream error for ids with no live run
pub const RUN_NOT_FOUND: &str = "Run not found or completed";

/// FIFO of one run's events
///
/// Producers are synchronous (the worker thread); the single consumer is the
/// async SSE stream.
#[derive(Clone)]
pub struct EventQueue {
    tx: UnboundedSender<PipelineEvent>,
    rx: Arc<tokio::sync::Mutex<UnboundedReceiver<PipelineEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    pub fn sender(&self) -> UnboundedSender<PipelineEvent> {
        self.tx.clone()
    }

    /// Enqueue; a queue nobody reads any more drops the event
    pub fn push(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Consume the queue, emitting `heartbeat` after `idle` without events.
    /// Ends after `done`.
    pub fn into_stream(self, idle: Duration) -> BoxStream<'static, PipelineEvent> {
        // Only the receiver travels with the stream so it ends when the producers are gone
        let rx = self.rx;
        stream::unfold(Some(rx), move |state| async move {
            let rx = state?;
            let next = {
                let mut guard = rx.lock().await;
                tokio::time::timeout(idle, guard.recv()).await
            };

            match next {
                Ok(Some(event)) => {
                    let keep_going = !event.is_terminal();
                    Some((event, keep_going.then_some(rx)))
                }
                Ok(None) => None,
                Err(_) => Some((PipelineEvent::Heartbeat, Some(rx))),
            }
        })
        .boxed()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Active runs and what they need to execute
pub struct RunRegistry {
    runs: Mutex<HashMap<String, EventQueue>>,
    pipeline: Arc<dyn AgentPipeline>,
    config: PipelineConfig,
    consoles: Consoles,
}

impl RunRegistry {
    pub fn new(pipeline: Arc<dyn AgentPipeline>, config: PipelineConfig) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            pipeline,
            config,
            consoles: Consoles::global(),
        }
    }

    /// Route captured output through different routers
    pub fn with_consoles(mut self, consoles: Consoles) -> Self {
        self.consoles = consoles;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<dyn AgentPipeline> {
        &self.pipeline
    }

    pub(crate) fn consoles(&self) -> Consoles {
        self.consoles
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<String, EventQueue>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Accept a requirement and start its worker; returns the run id
    pub fn start(self: &Arc<Self>, requirement: impl Into<String>) -> anyhow::Result<String> {
        let (run_id, queue) = self.accept();
        self.launch(&run_id, requirement.into(), &queue)?;
        Ok(run_id)
    }

    /// Like [`start`](Self::start), with the stream attached before the
    /// worker can produce anything
    pub fn start_and_stream(
        self: &Arc<Self>,
        requirement: impl Into<String>,
    ) -> anyhow::Result<(String, BoxStream<'static, PipelineEvent>)> {
        let (run_id, queue) = self.accept();
        let events = queue.clone().into_stream(self.config.stream.heartbeat());
        self.launch(&run_id, requirement.into(), &queue)?;
        Ok((run_id, events))
    }

    fn accept(&self) -> (String, EventQueue) {
        let run_id = Uuid::new_v4().to_string();
        let queue = EventQueue::new();
        self.runs().insert(run_id.clone(), queue.clone());
        (run_id, queue)
    }

    fn launch(
        self: &Arc<Self>,
        run_id: &str,
        requirement: String,
        queue: &EventQueue,
    ) -> anyhow::Result<()> {
        let job = RunJob {
            run_id: run_id.to_string(),
            requirement,
            queue: queue.sender(),
            registry: Arc::clone(self),
        };

        let spawned = thread::Builder::new()
            .name(format!("sdlc-run-{}", &run_id[..8]))
            .spawn(move || worker::run(job));

        if let Err(e) = spawned {
            self.remove(run_id);
            return Err(anyhow::anyhow!("Failed to spawn worker for run {}: {}", run_id, e));
        }

        info!(run_id, "Run started");
        Ok(())
    }

    /// Events of a live run; an unknown id yields a single `error`
    pub fn stream(&self, run_id: &str) -> BoxStream<'static, PipelineEvent> {
        let queue = self.runs().get(run_id).cloned();
        match queue {
            Some(queue) => queue.into_stream(self.config.stream.heartbeat()),
            None => stream::once(async { PipelineEvent::error(RUN_NOT_FOUND) }).boxed(),
        }
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.runs().contains_key(run_id)
    }

    /// Ids of runs still in progress, sorted
    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a run's entry; true if it was present
    pub(crate) fn remove(&self, run_id: &str) -> bool {
        self.runs().remove(run_id).is_some()
    }
}
