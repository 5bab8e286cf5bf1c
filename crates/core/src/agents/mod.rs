//! # Agents
//!
//! The lifecycle crew: role personas, bundled prompt templates, the seven
//! tasks and the sequential runner implementing [`AgentPipeline`].
//!
//! [`AgentPipeline`]: crate::swarm::pipeline::AgentPipeline

pub mod crew;
pub mod definitions;
pub mod prompts;
pub mod tasks;

pub use crew::{is_approved, SdlcCrew};
pub use definitions::{agent_for, create_agents, AgentDefinition};
pub use tasks::{sdlc_tasks, TaskSpec};
