//! Recording readers.
//!
//! Each supported format implements [`RecordingReader`]; [`ReaderFactory`]
//! picks one from the file extension. Readers parse the header eagerly and
//! load samples only on [`RecordingReader::read`].

use crate::error::{CogLoadError, Result};
use crate::types::Recording;
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

pub mod edf;
pub mod eeglab;
pub mod text;

pub use edf::EdfReader;
pub use eeglab::EeglabReader;
pub use text::TextReader;

/// Header-level description of a recording file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingMetadata {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    /// `None` for formats that do not store a rate and no override was given
    pub sampling_rate: Option<f64>,
    pub num_channels: usize,
    pub num_samples: usize,
    pub duration_secs: Option<f64>,
    pub channels: Vec<String>,
    pub start_time: Option<String>,
    pub file_type: String,
}

impl RecordingMetadata {
    fn new(path: &Path, file_type: &str) -> Result<Self> {
        Ok(Self {
            file_path: path.to_string_lossy().to_string(),
            file_name: path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
            file_size: std::fs::metadata(path)?.len(),
            sampling_rate: None,
            num_channels: 0,
            num_samples: 0,
            duration_secs: None,
            channels: Vec::new(),
            start_time: None,
            file_type: file_type.to_string(),
        })
    }

    fn set_sampling_rate(&mut self, sampling_rate: Option<f64>) {
        self.sampling_rate = sampling_rate;
        self.duration_secs = sampling_rate.map(|fs| self.num_samples as f64 / fs);
    }
}

/// Options shared by every reader
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderOptions {
    /// Replaces the rate stored in the file; required for text formats
    pub sampling_rate_hz: Option<f64>,
    /// Labels for files that store none (EEGLAB without a `channels.tsv`,
    /// headerless text). Must list every channel in file order.
    pub channel_labels: Option<Vec<String>>,
}

/// One open recording file
pub trait RecordingReader: Send + Sync {
    fn metadata(&self) -> &RecordingMetadata;

    /// Load every channel into memory.
    fn read(&self) -> Result<Recording>;

    /// Format name, e.g. "EDF" or "EEGLAB"
    fn format_name(&self) -> &str;
}

/// Creates readers based on file extension
pub struct ReaderFactory;

impl ReaderFactory {
    pub fn open(path: &Path, options: &ReaderOptions) -> Result<Box<dyn RecordingReader>> {
        if !path.exists() {
            return Err(CogLoadError::FileNotFound(path.display().to_string()));
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "edf" => Ok(Box::new(EdfReader::open(path, options)?)),
            "set" => Ok(Box::new(EeglabReader::open(path, options)?)),
            "csv" => Ok(Box::new(TextReader::csv(path, options)?)),
            "txt" | "ascii" => Ok(Box::new(TextReader::ascii(path, options)?)),
            _ => Err(CogLoadError::UnsupportedFormat(format!(
                "Unsupported file extension: '{}'",
                extension
            ))),
        }
    }

    /// Open and load in one step.
    pub fn read(path: &Path, options: &ReaderOptions) -> Result<Recording> {
        let reader = Self::open(path, options)?;
        log::info!(
            "Reading {} ({}, {} channels)",
            reader.metadata().file_name,
            reader.format_name(),
            reader.metadata().num_channels
        );
        reader.read()
    }

    pub fn supported_extensions() -> &'static [&'static str] {
        &["edf", "set", "csv", "txt", "ascii"]
    }

    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| Self::supported_extensions().contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Map a file read-only into memory.
pub(crate) fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // Read-only map of a file we do not modify
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Resolve the rate a reader should report: an explicit override wins over
/// the rate stored in the file.
pub(crate) fn resolve_sampling_rate(
    stored: Option<f64>,
    options: &ReaderOptions,
    file_name: &str,
) -> Option<f64> {
    match (options.sampling_rate_hz, stored) {
        (Some(forced), Some(stored)) if (forced - stored).abs() > f64::EPSILON => {
            log::warn!(
                "{}: using sampling rate {} Hz instead of the stored {} Hz",
                file_name,
                forced,
                stored
            );
            Some(forced)
        }
        (Some(forced), _) => Some(forced),
        (None, stored) => stored,
    }
}

/// Labels for a file that stores none: the configured list when given,
/// otherwise `Ch1..ChN`.
pub(crate) fn fallback_labels(
    options: &ReaderOptions,
    num_channels: usize,
    file_name: &str,
) -> Result<Vec<String>> {
    match &options.channel_labels {
        Some(labels) if labels.len() == num_channels => Ok(labels.clone()),
        Some(labels) => Err(CogLoadError::Read(format!(
            "{} has {} channels but {} channel labels were configured",
            file_name,
            num_channels,
            labels.len()
        ))),
        None => {
            log::warn!(
                "{} stores no channel labels; using Ch1..Ch{}, which match no region \
                 unless channel_labels is set",
                file_name,
                num_channels
            );
            Ok((0..num_channels).map(|i| format!("Ch{}", i + 1)).collect())
        }
    }
}
