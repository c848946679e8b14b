use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] mdsync_core::Error),
    #[error(transparent)]
    Transport(#[from] mdsync_core::remote::TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Config file already exists at {0} (use --force to overwrite)")]
    ConfigExists(PathBuf),
    #[error("No pending conflict for {0}")]
    NoConflict(PathBuf),
    #[error("Sync finished with problems: {0}")]
    Incomplete(String),
}
