//! # IO Utilities
//!
//! File system helpers for the run output directory. Every run lives in
//! `<output root>/<run id>/`; names coming from requests are validated before
//! they are joined onto that root.

use serde::de::DeserializeOwned;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::StateError;

/// Manifest file name inside a run directory
pub const MANIFEST_FILE: &str = "manifest.json";
/// Conversation log file name inside a run directory
pub const CONVERSATION_LOG_FILE: &str = "conversation_log.json";

/// Resolve the output root against the current directory
///
/// `SDLC_OUTPUT_DIR` is applied by the config layer; this only makes a
/// relative setting absolute.
pub fn resolve_output_root(configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        return configured.to_path_buf();
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(configured)
}

/// Check that `name` is a single plain path component
pub fn validate_name(name: &str) -> Result<&str, StateError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(StateError::InvalidName(name.to_string())),
    }
}

/// Read and parse a JSON file
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StateError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| StateError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| StateError::json(path, e))
}

/// List subdirectory names, newest name first; a missing root is empty
pub async fn list_dirs_desc(root: &Path) -> Result<Vec<String>, StateError> {
    if fs::metadata(root).await.is_err() {
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(root)
        .await
        .map_err(|e| StateError::io(root, e))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StateError::io(root, e))?
    {
        if let Ok(file_type) = entry.file_type().await {
            if file_type.is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    dirs.push(name);
                }
            }
        }
    }

    dirs.sort_unstable_by(|a, b| b.cmp(a));
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_output_root() {
        let abs = std::env::temp_dir().join("runs");
        assert_eq!(resolve_output_root(&abs), abs);
        assert!(resolve_output_root(Path::new("sdlc_output")).ends_with("sdlc_output"));
        assert!(resolve_output_root(Path::new("sdlc_output")).is_absolute());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("02_code.py").is_ok());
        assert!(validate_name("3f1c-uuid").is_ok());

        for bad in ["", ".", "..", "../etc", "a/b", "/etc/passwd", "a\\b"] {
            assert!(
                matches!(validate_name(bad), Err(StateError::InvalidName(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_list_dirs_desc() {
        let root = tempfile::tempdir().unwrap();
        for name in ["a-run", "c-run", "b-run"] {
            fs::create_dir(root.path().join(name)).await.unwrap();
        }
        fs::write(root.path().join("stray.txt"), "x").await.unwrap();

        let dirs = list_dirs_desc(root.path()).await.unwrap();
        assert_eq!(dirs, vec!["c-run", "b-run", "a-run"]);

        let missing = list_dirs_desc(&root.path().join("missing")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_read_json_errors() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("bad.json");
        fs::write(&path, "{not json").await.unwrap();

        let err = read_json::<serde_json::Value>(&path).await.unwrap_err();
        assert!(matches!(err, StateError::Json { .. }));

        let err = read_json::<serde_json::Value>(&root.path().join("none.json"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
