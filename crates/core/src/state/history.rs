//! # Run History
//!
//! Read side of the output directory, used by the HTTP API. Everything here
//! comes from persisted files, never from the live registry.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::io::{self, CONVERSATION_LOG_FILE, MANIFEST_FILE};
use super::manifest::{ConversationEntry, ConversationLog, ManifestPhase, RunManifest, RunSummary};
use crate::error::StateError;

/// A phase file with its content
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactView {
    #[serde(flatten)]
    pub phase: ManifestPhase,
    pub content: String,
    /// Bytes on disk
    pub size: u64,
    /// Extension with the leading dot, e.g. ".py"
    pub extension: String,
}

/// Manifest, phase files and conversation log of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub manifest: RunManifest,
    pub artifacts: Vec<ArtifactView>,
    pub conversations: Vec<ConversationEntry>,
}

/// Artifact file contents
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactContent {
    pub content: String,
    pub filename: String,
}

/// Reader over an output root
#[derive(Debug, Clone)]
pub struct RunHistory {
    root: PathBuf,
}

impl RunHistory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, StateError> {
        Ok(self.root.join(io::validate_name(run_id)?))
    }

    /// Every readable manifest, newest run directory first
    pub async fn list_manifests(&self) -> Result<Vec<RunManifest>, StateError> {
        let mut manifests = Vec::new();
        for entry in io::list_dirs_desc(&self.root).await? {
            let path = self.root.join(&entry).join(MANIFEST_FILE);
            match io::read_json::<RunManifest>(&path).await {
                Ok(manifest) => manifests.push(manifest),
                Err(e) if e.is_not_found() => {}
                Err(e) => debug!(error = %e, "Skipping unreadable manifest"),
            }
        }
        Ok(manifests)
    }

    /// History rows, newest first
    pub async fn summaries(&self) -> Result<Vec<RunSummary>, StateError> {
        Ok(self
            .list_manifests()
            .await?
            .iter()
            .map(RunSummary::from)
            .collect())
    }

    pub async fn load_manifest(&self, run_id: &str) -> Result<RunManifest, StateError> {
        let path = self.run_dir(run_id)?.join(MANIFEST_FILE);
        io::read_json(&path).await.map_err(|e| {
            if e.is_not_found() {
                StateError::NotFound(run_id.to_string())
            } else {
                e
            }
        })
    }

    /// Manifest plus file contents; missing phase files read as empty
    pub async fn load_detail(&self, run_id: &str) -> Result<RunDetail, StateError> {
        let manifest = self.load_manifest(run_id).await?;
        let dir = self.run_dir(run_id)?;

        let mut artifacts = Vec::with_capacity(manifest.phases.len());
        for phase in &manifest.phases {
            let (content, size) = match io::validate_name(&phase.output_file) {
                Ok(name) => {
                    let path = dir.join(name);
                    match fs::read_to_string(&path).await {
                        Ok(content) => {
                            let size = content.len() as u64;
                            (content, size)
                        }
                        Err(_) => (String::new(), 0),
                    }
                }
                Err(_) => (String::new(), 0),
            };
            let extension = Path::new(&phase.output_file)
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();

            artifacts.push(ArtifactView {
                phase: phase.clone(),
                content,
                size,
                extension,
            });
        }

        let conversations = match io::read_json::<ConversationLog>(&dir.join(CONVERSATION_LOG_FILE)).await {
            Ok(log) => log.conversations,
            Err(_) => Vec::new(),
        };

        Ok(RunDetail {
            manifest,
            artifacts,
            conversations,
        })
    }

    /// One file of a run
    pub async fn load_artifact(
        &self,
        run_id: &str,
        filename: &str,
    ) -> Result<ArtifactContent, StateError> {
        let path = self.run_dir(run_id)?.join(io::validate_name(filename)?);
        let content = fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StateError::NotFound(format!("{}/{}", run_id, filename))
            } else {
                StateError::io(&path, e)
            }
        })?;

        Ok(ArtifactContent {
            content,
            filename: filename.to_string(),
        })
    }
}
