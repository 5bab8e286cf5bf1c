//! # Swarm Orchestration
//!
//! Runs the lifecycle pipeline in the background and streams its progress.
//!
//! ## Run Flow
//!
//! ```text
//! start → worker thread → kickoff ⟶ task done → PhaseTransition ⟶ queue → stream
//!                  │                                                  ▲
//!                  └── console write → OutputRouter → PhaseHandler ───┘
//! ```

pub mod callback;
pub mod events;
pub mod handler;
pub mod pipeline;
pub mod registry;
mod worker;

pub use callback::PhaseTransition;
pub use events::{PhaseSummary, PipelineEvent};
pub use handler::{FlushPolicy, PhaseHandler};
pub use pipeline::{
    build_phases, AgentPipeline, CrewOutput, Phase, PhaseDef, RunStatus, TaskCallback,
    TaskOutput, PHASE_DEFS,
};
pub use registry::{EventQueue, RunRegistry, RUN_NOT_FOUND};
