use crate::baseline::CentralTendency;
use crate::error::{CogLoadError, Result};
use crate::readers::ReaderOptions;
use crate::taxonomy::{BandRange, BandTable, IndexPairing, RegionTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Built-in parameter sets accepted by [`AnalysisConfig::preset`]
pub const PRESET_NAMES: &[&str] = &["default", "protocol-a", "protocol-b"];

/// Which part of the baseline recording feeds the reference PSD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BaselineSpan {
    #[default]
    Full,
    FirstSeconds { seconds: f64 },
}

/// Where the baseline recording comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    /// A separate resting-state file per subject
    #[default]
    SeparateFile,
    /// The beginning of the task recording itself
    TaskPrefix,
}

/// What to do when a (region, band) pair used by the indices has no usable
/// baseline reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientBaselinePolicy {
    /// Normalize that pair to NaN and keep the subject
    #[default]
    NanPair,
    /// Skip the whole subject
    SkipSubject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BaselineConfig {
    pub source: BaselineSource,
    pub span: BaselineSpan,
    pub estimator: CentralTendency,
    pub on_insufficient: InsufficientBaselinePolicy,
}

/// Filename matching for subject directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Case-insensitive substrings marking the resting recording
    pub baseline_keywords: Vec<String>,
    /// Case-insensitive substrings marking the task recording
    pub task_keywords: Vec<String>,
    /// Optional glob on subject directory names (e.g. "S*")
    pub subject_glob: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            baseline_keywords: vec!["baseline".to_string()],
            task_keywords: vec!["postexperimental".to_string(), "experimental".to_string()],
            subject_glob: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub header: bool,
    /// Token written for undefined values
    pub na_rep: String,
    pub condition: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            header: true,
            na_rep: "NaN".to_string(),
            condition: crate::types::CONDITION_LABEL.to_string(),
        }
    }
}

/// Every tunable of the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Overrides the rate stored in the recordings (required for CSV/ASCII)
    pub sampling_rate_hz: Option<f64>,
    /// Analysis window length, also the Welch segment length
    pub window_secs: f64,
    pub baseline: BaselineConfig,
    pub bands: BandTable,
    pub regions: RegionTable,
    pub pairing: IndexPairing,
    /// Reduction used for per-window band power
    pub window_estimator: CentralTendency,
    /// Keep only the first N channels of every recording
    pub max_channels: Option<usize>,
    /// Channel labels, in file order, for recordings that store none
    pub channel_labels: Option<Vec<String>>,
    pub match_case_insensitive: bool,
    /// Process subjects and channels on the rayon pool
    pub parallel: bool,
    pub discovery: DiscoveryConfig,
    pub output: OutputConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: None,
            window_secs: 2.0,
            baseline: BaselineConfig::default(),
            bands: BandTable::default(),
            regions: RegionTable::default(),
            pairing: IndexPairing::default(),
            window_estimator: CentralTendency::Mean,
            max_channels: None,
            channel_labels: None,
            match_case_insensitive: false,
            parallel: false,
            discovery: DiscoveryConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Multi-subject protocol: 250 Hz, 2 s windows, whole baseline file,
    /// mean reference, baseline theta capped at 7 Hz.
    pub fn protocol_a() -> Self {
        Self {
            sampling_rate_hz: Some(250.0),
            window_secs: 2.0,
            bands: BandTable {
                baseline_theta_upper_hz: Some(7.0),
                ..BandTable::default()
            },
            ..Self::default()
        }
    }

    /// Single-recording protocol: 256 Hz, 5 s windows, baseline from the
    /// first 30 s of the task recording, 75th-percentile reference, window
    /// theta 4-7 Hz with baseline theta 4-8 Hz, first 32 channels.
    pub fn protocol_b() -> Self {
        Self {
            sampling_rate_hz: Some(256.0),
            window_secs: 5.0,
            baseline: BaselineConfig {
                source: BaselineSource::TaskPrefix,
                span: BaselineSpan::FirstSeconds { seconds: 30.0 },
                estimator: CentralTendency::Percentile75,
                on_insufficient: InsufficientBaselinePolicy::NanPair,
            },
            bands: BandTable {
                theta: BandRange::new(4.0, 7.0),
                baseline_theta_upper_hz: Some(8.0),
                ..BandTable::default()
            },
            max_channels: Some(32),
            ..Self::default()
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "default" => Ok(Self::default()),
            "protocol-a" | "a" => Ok(Self::protocol_a()),
            "protocol-b" | "b" => Ok(Self::protocol_b()),
            other => Err(CogLoadError::InvalidParameter(format!(
                "Unknown preset '{}'. Available: {}",
                other,
                PRESET_NAMES.join(", ")
            ))),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CogLoadError::FileNotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Default per-user config file location, if one exists.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("cogload").join("config.json"))
            .filter(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(CogLoadError::InvalidParameter(format!(
                "window_secs must be positive, got {}",
                self.window_secs
            )));
        }
        if let Some(fs) = self.sampling_rate_hz {
            if !(fs.is_finite() && fs > 0.0) {
                return Err(CogLoadError::InvalidParameter(format!(
                    "sampling_rate_hz must be positive, got {}",
                    fs
                )));
            }
        }
        if let BaselineSpan::FirstSeconds { seconds } = self.baseline.span {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(CogLoadError::InvalidParameter(format!(
                    "baseline span must be positive, got {} s",
                    seconds
                )));
            }
        }
        if self.max_channels == Some(0) {
            return Err(CogLoadError::InvalidParameter(
                "max_channels must be at least 1".to_string(),
            ));
        }
        if let Some(labels) = &self.channel_labels {
            if labels.is_empty() || labels.iter().any(|l| l.trim().is_empty()) {
                return Err(CogLoadError::InvalidParameter(
                    "channel_labels must list at least one non-empty label".to_string(),
                ));
            }
        }
        if self.discovery.baseline_keywords.is_empty() || self.discovery.task_keywords.is_empty() {
            return Err(CogLoadError::InvalidParameter(
                "discovery keywords must not be empty".to_string(),
            ));
        }
        self.bands.validate()
    }

    /// Reader settings carried by this configuration.
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            sampling_rate_hz: self.sampling_rate_hz,
            channel_labels: self.channel_labels.clone(),
        }
    }

    /// Window length in samples at the given rate (at least one sample).
    pub fn window_samples(&self, sampling_rate: f64) -> usize {
        ((self.window_secs * sampling_rate).round() as usize).max(1)
    }
}
