//! Persisted grading history.
//!
//! The whole list lives in one JSON file, newest entry first. Every mutation
//! rewrites the file: serialize to `<file>.tmp`, then rename over the
//! original so a crash never leaves a half-written history behind.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{GradingResult, HistoryEntry};

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Could not write history to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create history directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("History entry not found: {0}")]
    NotFound(String),
}

pub struct HistoryStore {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Load the history at `path`.
    ///
    /// A missing file is an empty history. An unreadable or corrupt file is
    /// logged and also treated as empty; it is overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        tracing::debug!(path = %path.display(), count = entries.len(), "History loaded");
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, newest first.
    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a graded result as the newest entry.
    pub fn add(&mut self, result: GradingResult) -> Result<&HistoryEntry, HistoryError> {
        self.entries.insert(0, HistoryEntry::new(result));
        if let Err(e) = self.persist() {
            self.entries.remove(0);
            return Err(e);
        }
        tracing::info!(id = %self.entries[0].id, count = self.entries.len(), "History entry added");
        Ok(&self.entries[0])
    }

    pub fn delete(&mut self, id: &str) -> Result<HistoryEntry, HistoryError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))?;

        let removed = self.entries.remove(index);
        if let Err(e) = self.persist() {
            self.entries.insert(index, removed);
            return Err(e);
        }
        tracing::info!(id, count = self.entries.len(), "History entry deleted");
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), HistoryError> {
        let previous = std::mem::take(&mut self.entries);
        if let Err(e) = self.persist() {
            self.entries = previous;
            return Err(e);
        }
        tracing::info!(removed = previous.len(), "History cleared");
        Ok(())
    }

    fn persist(&self) -> Result<(), HistoryError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| HistoryError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let write_err = |source: std::io::Error| HistoryError::Write {
            path: self.path.display().to_string(),
            source,
        };

        fs::write(&tmp_path, json.as_bytes()).map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> Vec<HistoryEntry> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not read history, starting empty"
            );
            return Vec::new();
        }
    };

    serde_json::from_str(&contents).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Corrupt history file, starting empty");
        Vec::new()
    })
}
