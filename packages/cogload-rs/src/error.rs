use crate::baseline::Insufficiency;
use crate::taxonomy::{Band, Region};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CogLoadError {
    #[error("Recording file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read recording: {0}")]
    Read(String),

    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Spectral estimation failed: {0}")]
    Spectral(String),

    #[error("Insufficient baseline data for {region}/{band}: {reason}")]
    InsufficientBaseline {
        region: Region,
        band: Band,
        reason: Insufficiency,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CogLoadError>;
