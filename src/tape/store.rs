//! Tape persistence.
//!
//! # Responsibilities
//! - Map tape names to `<root>/<name>.<ext>`
//! - Refuse names that would leave the tape root
//! - Load and save whole tapes
//!
//! # Design Decisions
//! - Names are checked lexically before any filesystem call
//! - Saves write a sibling temp file and rename it over the tape, so a
//!   concurrent reader sees either the old or the new document
//! - A missing file is not an error; callers treat it as a fresh tape

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::config::TapeConfig;
use crate::tape::interaction::{from_yaml, to_yaml, Interaction};
use crate::tape::TapeError;

/// Check that a tape name stays inside the tape root once resolved.
///
/// Nested names such as `suite/login` are allowed; absolute paths and any
/// name whose normalized form starts with `..` are not.
pub fn validate_tape_name(name: &str) -> Result<(), TapeError> {
    let invalid = || TapeError::InvalidTapeName(name.to_string());

    if name.is_empty() || name.contains('\0') {
        return Err(invalid());
    }

    let mut depth: usize = 0;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            Component::RootDir | Component::Prefix(_) => return Err(invalid()),
        }
    }

    // `a/..` resolves to the root itself, which is not a tape.
    if depth == 0 {
        return Err(invalid());
    }
    Ok(())
}

/// Filesystem-backed tape storage.
#[derive(Debug, Clone)]
pub struct TapeStore {
    root: PathBuf,
    extension: String,
}

impl TapeStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &TapeConfig) -> Self {
        Self::new(config.root.clone(), config.extension.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tape name to its file path, rejecting escapes.
    pub fn resolve_path(&self, name: &str) -> Result<PathBuf, TapeError> {
        validate_tape_name(name)?;
        Ok(self.root.join(format!("{}.{}", name, self.extension)))
    }

    /// Load a tape. `Ok(None)` means no file exists for this name yet.
    pub async fn load(&self, name: &str) -> Result<Option<Vec<Interaction>>, TapeError> {
        let path = self.resolve_path(name)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(TapeError::Io { path, source }),
        };

        let interactions =
            from_yaml(&content).map_err(|source| TapeError::Parse { path: path.clone(), source })?;

        tracing::debug!(tape = %name, path = ?path, records = interactions.len(), "Tape loaded");
        Ok(Some(interactions))
    }

    /// Replace the tape's file with the given records.
    pub async fn save(&self, name: &str, interactions: &[Interaction]) -> Result<PathBuf, TapeError> {
        let path = self.resolve_path(name)?;
        let document = to_yaml(interactions).map_err(TapeError::Serialize)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TapeError::Io { path: parent.to_path_buf(), source })?;
        }

        let temp_path = temp_path_for(&path);
        if let Err(source) = tokio::fs::write(&temp_path, document.as_bytes()).await {
            return Err(TapeError::Io { path: temp_path, source });
        }
        if let Err(source) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(TapeError::Io { path, source });
        }

        tracing::debug!(tape = %name, path = ?path, records = interactions.len(), "Tape saved");
        Ok(path)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
}
