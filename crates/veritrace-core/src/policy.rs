//! Policy document loading.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading a policy document.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy document {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A plain-text policy document, read fully into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    path: PathBuf,
    text: String,
}

impl PolicyDocument {
    /// Read a policy document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PolicyError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(path, text))
    }

    /// Wrap text already in memory. `path` is recorded for reporting only.
    /// Blank text is accepted.
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
