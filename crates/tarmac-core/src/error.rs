//! Error kinds shared across the workspace (§7 of the design).
//!
//! Usage errors never reach this far (they're caught at CLI argument
//! parsing). Everything below maps to exit codes 2 ("I/O") or 3
//! ("index/format corrupt"); lookup failures are never represented here —
//! callers get an explicit `Option`/`Result` negative result instead, as
//! §7 requires.

use std::path::PathBuf;

/// Top-level error for anything that can abort indexing or a query.
#[derive(Debug, thiserror::Error)]
pub enum TarmacError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index file is corrupt or uses an unsupported format: {0}")]
    Format(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl TarmacError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TarmacError::Io { path: path.into(), source }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        TarmacError::Format(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        TarmacError::Internal(msg.into())
    }

    /// Process exit code per §6: 2 for I/O failures, 3 for format/internal
    /// corruption.
    pub fn exit_code(&self) -> i32 {
        match self {
            TarmacError::Io { .. } => 2,
            TarmacError::Format(_) | TarmacError::Internal(_) => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, TarmacError>;
