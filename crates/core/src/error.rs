use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("no comments found in {}", .0.display())]
    EmptyResult(PathBuf),

    #[error("{dropped} posts could not be migrated (unknown thread or empty message)")]
    MalformedRecords { dropped: usize },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid table name: {0:?}")]
    InvalidIdentifier(String),

    #[error("executing {} failed: {reason}", .artifact.display())]
    ExecutionFailed { artifact: PathBuf, reason: String },
}

impl MigrationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }

    /// Path of the statement file left behind by a failed execution
    pub fn artifact(&self) -> Option<&std::path::Path> {
        match self {
            MigrationError::ExecutionFailed { artifact, .. } => Some(artifact.as_path()),
            _ => None,
        }
    }
}
