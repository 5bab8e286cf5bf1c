pub mod artifacts;
pub mod history;
pub mod io;
pub mod manifest;

pub use artifacts::{extract_code, RunArchive};
pub use history::{ArtifactContent, ArtifactView, RunDetail, RunHistory};
pub use manifest::{ConversationEntry, ConversationLog, ManifestPhase, RunManifest, RunSummary};
