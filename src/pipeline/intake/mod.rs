pub mod format;
pub mod progress;
pub mod batch;

pub use format::*;
pub use progress::*;
pub use batch::*;

use std::path::Path;

use thiserror::Error;

use crate::pipeline::preprocess::PrepareError;

/// A user-selected image file, held in memory for one preparation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Declared file name, used for format hints and messages.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk. The name is the path's file name.
    pub fn from_path(path: &Path) -> Result<Self, IntakeError> {
        let bytes = std::fs::read(path).map_err(|e| IntakeError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(Self { name, bytes })
    }
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HEIF converter '{program}' is not available: {reason}")]
    ToolUnavailable { program: String, reason: String },

    #[error("HEIF conversion failed: {0}")]
    ConversionFailed(String),
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Could not read file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File {index} of {total} ('{name}') failed: {source}")]
    FileFailed {
        /// 1-based position in the batch.
        index: usize,
        total: usize,
        name: String,
        #[source]
        source: PrepareError,
    },
}
