//! Error types for mdsync-core

use std::path::PathBuf;

use thiserror::Error;

use crate::remote::{BlockError, TransportError};

/// Result type alias using mdsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mdsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// One or more remote blocks could not be converted
    #[error("Conversion failed for {} block(s); first at index {}: {}", .0.len(), first_index(.0), first_message(.0))]
    Conversion(Vec<BlockError>),

    /// Both sides changed and the manual strategy has no decision yet
    #[error("Conflict requires a manual resolution: {0}")]
    ConflictUnresolved(String),

    /// Remote transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local document could not be read or written
    #[error("Local IO error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Mapping store unreachable or corrupt
    #[error("Mapping store error: {0}")]
    Mapping(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Front-matter could not be parsed or rendered
    #[error("Front-matter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fatal error stopped a run; carries its message
    #[error("Sync run aborted: {0}")]
    Aborted(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Wrap an IO error with the local path it happened on
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors stop a whole run; everything else fails a single document.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Auth(_))
                | Self::Mapping(_)
                | Self::LibSql(_)
                | Self::Aborted(_)
        )
    }
}

fn first_index(errors: &[BlockError]) -> String {
    errors
        .first()
        .map_or_else(|| "-".to_string(), |error| error.index.to_string())
}

fn first_message(errors: &[BlockError]) -> String {
    errors
        .first()
        .map_or_else(String::new, ToString::to_string)
}
