use crate::error::{CogLoadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frequency band used by the cognitive indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Theta,
    Alpha,
    Beta,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Theta, Band::Alpha, Band::Beta];

    pub fn name(&self) -> &'static str {
        match self {
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anatomical channel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Frontal,
    Parietal,
    Prefrontal,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Frontal, Region::Parietal, Region::Prefrontal];

    pub fn name(&self) -> &'static str {
        match self {
            Region::Frontal => "frontal",
            Region::Parietal => "parietal",
            Region::Prefrontal => "prefrontal",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive frequency range in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub lo: f64,
    pub hi: f64,
}

impl BandRange {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.lo && freq <= self.hi
    }

    /// Indices of the frequency bins whose center falls inside the range.
    pub fn select_bins(&self, frequencies: &[f64]) -> Vec<usize> {
        frequencies
            .iter()
            .enumerate()
            .filter(|&(_, &f)| self.contains(f))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Band edges shared by baseline and window computation.
///
/// `baseline_theta_upper_hz` is the only sanctioned difference between the
/// two: when set, the baseline theta band ends there instead of at
/// `theta.hi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandTable {
    pub theta: BandRange,
    pub alpha: BandRange,
    pub beta: BandRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_theta_upper_hz: Option<f64>,
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            theta: BandRange::new(4.0, 8.0),
            alpha: BandRange::new(8.0, 12.0),
            beta: BandRange::new(12.0, 30.0),
            baseline_theta_upper_hz: None,
        }
    }
}

impl BandTable {
    /// Range used for per-window band power
    pub fn range(&self, band: Band) -> BandRange {
        match band {
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
        }
    }

    /// Range used for the baseline reference
    pub fn baseline_range(&self, band: Band) -> BandRange {
        match (band, self.baseline_theta_upper_hz) {
            (Band::Theta, Some(hi)) => BandRange::new(self.theta.lo, hi),
            _ => self.range(band),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for band in Band::ALL {
            for range in [self.range(band), self.baseline_range(band)] {
                if !range.lo.is_finite() || !range.hi.is_finite() || range.lo < 0.0 {
                    return Err(CogLoadError::InvalidParameter(format!(
                        "{} band edges must be finite and non-negative, got [{}, {}]",
                        band, range.lo, range.hi
                    )));
                }
                if range.lo > range.hi {
                    return Err(CogLoadError::InvalidParameter(format!(
                        "{} band lower edge {} exceeds upper edge {}",
                        band, range.lo, range.hi
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Channel labels aggregated by each region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionTable {
    pub frontal: Vec<String>,
    pub parietal: Vec<String>,
    pub prefrontal: Vec<String>,
}

impl Default for RegionTable {
    fn default() -> Self {
        let labels = |names: &[&str]| -> Vec<String> { names.iter().map(|s| s.to_string()).collect() };
        Self {
            frontal: labels(&["Fz", "F3", "F4"]),
            parietal: labels(&["Pz", "P3", "P4"]),
            prefrontal: labels(&["FP1", "FP2"]),
        }
    }
}

impl RegionTable {
    pub fn labels(&self, region: Region) -> &[String] {
        match region {
            Region::Frontal => &self.frontal,
            Region::Parietal => &self.parietal,
            Region::Prefrontal => &self.prefrontal,
        }
    }
}

/// Which region each index band is measured over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexPairing {
    pub theta: Region,
    pub alpha: Region,
    pub beta: Region,
}

impl Default for IndexPairing {
    fn default() -> Self {
        Self {
            theta: Region::Frontal,
            alpha: Region::Parietal,
            beta: Region::Prefrontal,
        }
    }
}

impl IndexPairing {
    pub fn region_for(&self, band: Band) -> Region {
        match band {
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
        }
    }

    pub fn pairs(&self) -> [(Region, Band); 3] {
        Band::ALL.map(|band| (self.region_for(band), band))
    }
}
