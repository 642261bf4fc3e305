use crate::channels::ChannelResolver;
use crate::config::{AnalysisConfig, BaselineSpan};
use crate::error::{CogLoadError, Result};
use crate::spectral::{effective_window, SpectralEstimator};
use crate::taxonomy::{Band, Region};
use crate::types::Recording;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reduction applied to a flattened (channels × bins) power selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralTendency {
    #[default]
    Mean,
    Percentile75,
}

impl CentralTendency {
    /// `None` for an empty selection.
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        match self {
            CentralTendency::Mean => mean(values),
            CentralTendency::Percentile75 => percentile(values, 75.0),
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Why a (region, band) reference could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Insufficiency {
    NoChannels,
    NoFrequencyBins,
    NonPositivePower,
}

impl fmt::Display for Insufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insufficiency::NoChannels => write!(f, "no channels of the region in the recording"),
            Insufficiency::NoFrequencyBins => write!(f, "no frequency bins inside the band"),
            Insufficiency::NonPositivePower => write!(f, "reference power is not positive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceValue {
    Power(f64),
    Insufficient(Insufficiency),
}

/// Resting-state reference power per (region, band)
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineReference {
    values: BTreeMap<(Region, Band), ReferenceValue>,
}

impl BaselineReference {
    pub fn from_values(values: BTreeMap<(Region, Band), ReferenceValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, region: Region, band: Band) -> ReferenceValue {
        self.values
            .get(&(region, band))
            .copied()
            .unwrap_or(ReferenceValue::Insufficient(Insufficiency::NoChannels))
    }

    pub fn power(&self, region: Region, band: Band) -> Result<f64> {
        match self.get(region, band) {
            ReferenceValue::Power(p) => Ok(p),
            ReferenceValue::Insufficient(reason) => Err(CogLoadError::InsufficientBaseline {
                region,
                band,
                reason,
            }),
        }
    }

    /// Check that every listed pair has a usable reference.
    pub fn require(&self, pairs: &[(Region, Band)]) -> Result<()> {
        for &(region, band) in pairs {
            self.power(region, band)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Region, Band, ReferenceValue)> + '_ {
        self.values.iter().map(|(&(r, b), &v)| (r, b, v))
    }
}

/// Compute the reference power for every (region, band) pair.
///
/// The PSD is taken over the whole baseline segment (all of `recording`, or
/// its first seconds per the configured span) with the analysis window
/// shrunk to the segment when the segment is shorter.
pub fn compute_baseline(
    recording: &Recording,
    config: &AnalysisConfig,
    estimator: &dyn SpectralEstimator,
) -> Result<BaselineReference> {
    let fs = recording.sampling_rate();
    let head;
    let segment = match config.baseline.span {
        BaselineSpan::Full => recording,
        BaselineSpan::FirstSeconds { seconds } => {
            head = recording.prefix((seconds * fs).round() as usize);
            &head
        }
    };
    if segment.num_samples() == 0 {
        return Err(CogLoadError::InvalidRecording(
            "baseline segment has no samples".to_string(),
        ));
    }

    let window_len = effective_window(config.window_samples(fs), segment.num_samples());
    log::debug!(
        "Baseline PSD over {} samples ({} channels), window {}",
        segment.num_samples(),
        segment.num_channels(),
        window_len
    );
    let spectrum = estimator.estimate(segment.data(), fs, window_len)?;

    let resolved = ChannelResolver::new(segment.channels(), config.match_case_insensitive)
        .resolve_regions(&config.regions);

    let mut values = BTreeMap::new();
    for region in Region::ALL {
        let rows = resolved.get(region);
        for band in Band::ALL {
            let bins = spectrum.band_bins(config.bands.baseline_range(band));
            let value = if rows.is_empty() {
                ReferenceValue::Insufficient(Insufficiency::NoChannels)
            } else if bins.is_empty() {
                ReferenceValue::Insufficient(Insufficiency::NoFrequencyBins)
            } else {
                match config.baseline.estimator.reduce(&spectrum.select(rows, &bins)) {
                    Some(p) if p.is_finite() && p > 0.0 => ReferenceValue::Power(p),
                    _ => ReferenceValue::Insufficient(Insufficiency::NonPositivePower),
                }
            };
            if let ReferenceValue::Insufficient(reason) = value {
                log::debug!("Baseline {}/{} insufficient: {}", region, band, reason);
            }
            values.insert((region, band), value);
        }
    }

    Ok(BaselineReference { values })
}
