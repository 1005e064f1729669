use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("no serial device could be opened (tried: {tried})")]
    Connection { tried: String },
    #[error("failed to persist {pending} samples to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        pending: usize,
        #[source]
        source: io::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("config error: {0}")]
    Config(String),
}

impl CaptureError {
    /// Whether acquisition can continue after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Persistence { .. })
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
