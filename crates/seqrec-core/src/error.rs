use crate::State;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown state: {0}")]
    UnknownState(State),
    #[error("Unknown user: {0}")]
    UnknownUser(String),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Failures while saving or loading a persisted policy.
///
/// A missing file is expected before the first training run; a file that
/// exists but cannot be parsed is not, and must not be mistaken for one.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("No saved policy at {}", path.display())]
    NotFound { path: PathBuf },
    #[error("Saved policy at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
