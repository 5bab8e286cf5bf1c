//! # Run Artifacts
//!
//! Writing a run directory: one file per phase with its UUID header, then
//! the manifest and conversation log. Written from the run's own thread, so
//! this side is blocking I/O.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use super::io::{CONVERSATION_LOG_FILE, MANIFEST_FILE};
use super::manifest::{ConversationLog, RunManifest};
use crate::error::StateError;

/// Join the fenced code blocks of a model reply; text without blocks is
/// returned unchanged.
pub fn extract_code(text: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();

    let Some(re) = FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:python)?\s*\n(.*?)```").ok())
        .as_ref()
    else {
        return text.to_string();
    };

    let blocks: Vec<&str> = re
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    if blocks.is_empty() {
        text.to_string()
    } else {
        blocks.join("\n\n")
    }
}

/// Header line tying a file to its phase
pub fn uuid_header(file_name: &str, phase_id: &str) -> String {
    if file_name.ends_with(".py") {
        format!("# Phase UUID: {}\n\n", phase_id)
    } else if file_name.ends_with(".md") {
        format!("<!-- Phase UUID: {} -->\n\n", phase_id)
    } else {
        String::new()
    }
}

/// Placeholder content for a phase that produced nothing
pub fn not_generated(key: &str) -> String {
    format!("# {} — not generated", key)
}

/// One run's output directory
#[derive(Debug, Clone)]
pub struct RunArchive {
    dir: PathBuf,
}

impl RunArchive {
    /// Create `<root>/<run_id>/`
    pub fn create(root: &Path, run_id: &str) -> Result<Self, StateError> {
        let dir = root.join(run_id);
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a phase file, prefixed with its UUID header
    pub fn save_artifact(
        &self,
        file_name: &str,
        content: &str,
        phase_id: &str,
    ) -> Result<PathBuf, StateError> {
        let path = self.dir.join(file_name);
        let body = format!("{}{}", uuid_header(file_name, phase_id), content);
        fs::write(&path, body).map_err(|e| StateError::io(&path, e))?;
        debug!(path = %path.display(), "Saved artifact");
        Ok(path)
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<(), StateError> {
        self.write_json(MANIFEST_FILE, manifest)
    }

    pub fn write_conversation_log(&self, log: &ConversationLog) -> Result<(), StateError> {
        self.write_json(CONVERSATION_LOG_FILE, log)
    }

    /// Number of entries in the run directory
    pub fn file_count(&self) -> Result<usize, StateError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StateError::io(&self.dir, e))?;
        Ok(entries.filter_map(Result::ok).count())
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<(), StateError> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value).map_err(|e| StateError::json(&path, e))?;
        fs::write(&path, json).map_err(|e| StateError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::pipeline::RunStatus;

    #[test]
    fn test_extract_code_joins_blocks() {
        let reply = "Intro\n```python\nimport os\n\n```\ntext\n```\nprint(1)\n```\n";
        assert_eq!(extract_code(reply), "import os\n\nprint(1)");
    }

    #[test]
    fn test_extract_code_without_blocks() {
        assert_eq!(extract_code("just prose"), "just prose");
        assert_eq!(extract_code("```python no newline```"), "```python no newline```");
    }

    #[test]
    fn test_extract_code_bare_fence() {
        let reply = "Sure.\n```\ndef f():\n    return 1\n```";
        assert_eq!(extract_code(reply), "def f():\n    return 1");
    }

    #[test]
    fn test_uuid_headers() {
        assert_eq!(uuid_header("02_code.py", "id-1"), "# Phase UUID: id-1\n\n");
        assert_eq!(uuid_header("03_review.md", "id-2"), "<!-- Phase UUID: id-2 -->\n\n");
        assert_eq!(uuid_header("notes.txt", "id-3"), "");
    }

    #[test]
    fn test_archive_layout() {
        let root = tempfile::tempdir().unwrap();
        let archive = RunArchive::create(root.path(), "run-1").unwrap();

        let path = archive.save_artifact("02_code.py", "x = 1", "pid").unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "# Phase UUID: pid\n\nx = 1"
        );

        let manifest: RunManifest = serde_json::from_str(r#"{"run_id": "run-1"}"#).unwrap();
        archive.write_manifest(&manifest).unwrap();
        archive
            .write_conversation_log(&ConversationLog {
                run_id: "run-1".into(),
                timestamp: String::new(),
                conversations: Vec::new(),
            })
            .unwrap();

        assert_eq!(archive.file_count().unwrap(), 3);
        let back: RunManifest = serde_json::from_str(
            &fs::read_to_string(archive.dir().join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(back.status, RunStatus::Completed);
    }

    #[test]
    fn test_not_generated_placeholder() {
        assert_eq!(not_generated("ui_code"), "# ui_code — not generated");
    }
}
