use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::transfer::Stage;

#[derive(Error, Debug)]
pub enum SercomError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to open serial device {device} at {baud} baud: {source}")]
    SerialOpen {
        device: String,
        baud: u32,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to open {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "Timed out after {timeout_ms} ms waiting for {expected} during {stage}; received: {received}"
    )]
    TagTimeout {
        stage: Stage,
        expected: String,
        received: String,
        timeout_ms: u64,
    },

    #[error("Transfer interrupted after {sent} of {total} bytes")]
    TransferInterrupted { sent: u64, total: u64 },

    #[error("Another transfer is already in progress")]
    TransferInProgress,

    #[error("Unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Snippet {name} failed: {message}")]
    Snippet { name: String, message: String },
}

impl SercomError {
    /// Wrap an open failure with the offending path.
    pub fn file_open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SercomError::FileOpen {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SercomError>;
