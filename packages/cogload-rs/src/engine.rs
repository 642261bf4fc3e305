//! Window Index Engine.
//!
//! Slides fixed-length windows over a task recording and turns each window
//! into baseline-normalized band powers and the three cognitive indices.
//! Windows are independent of each other; the only shared input is the
//! subject's read-only [`BaselineReference`].

use crate::baseline::{BaselineReference, ReferenceValue};
use crate::channels::{ChannelResolver, ResolvedRegions};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::spectral::{effective_window, SpectralEstimator, Spectrum};
use crate::taxonomy::Band;
use crate::types::{Recording, ResultRow, Window};
use ndarray::s;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Split `total_samples` into consecutive windows of `window_len` samples.
///
/// The last window holds whatever remains, so the windows cover
/// `[0, total_samples)` exactly.
pub fn partition_windows(total_samples: usize, window_len: usize) -> Vec<Window> {
    if window_len == 0 {
        return Vec::new();
    }
    (0..total_samples.div_ceil(window_len))
        .map(|i| Window {
            index: i + 1,
            start: i * window_len,
            end: ((i + 1) * window_len).min(total_samples),
        })
        .collect()
}

/// Ratio indices derived from normalized theta/alpha/beta power
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CognitiveIndices {
    pub task_load: f64,
    pub engagement: f64,
    pub fatigue: f64,
}

impl CognitiveIndices {
    /// Each index is NaN when its denominator is not strictly positive.
    pub fn from_normalized(theta: f64, alpha: f64, beta: f64) -> Self {
        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { f64::NAN };
        Self {
            task_load: ratio(theta, alpha),
            engagement: ratio(beta, alpha + theta),
            fatigue: ratio(alpha, theta),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Emitted(ResultRow),
    /// Fewer samples than one second
    TooShort,
    /// At least one band has no frequency bin in this window's PSD
    NoBandBins,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub total: usize,
    pub emitted: usize,
    pub too_short: usize,
    pub no_band_bins: usize,
}

impl WindowStats {
    fn record(&mut self, outcome: &WindowOutcome) {
        self.total += 1;
        match outcome {
            WindowOutcome::Emitted(_) => self.emitted += 1,
            WindowOutcome::TooShort => self.too_short += 1,
            WindowOutcome::NoBandBins => self.no_band_bins += 1,
        }
    }
}

pub struct WindowIndexEngine<'a> {
    config: &'a AnalysisConfig,
    estimator: &'a dyn SpectralEstimator,
    baseline: &'a BaselineReference,
}

impl<'a> WindowIndexEngine<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        estimator: &'a dyn SpectralEstimator,
        baseline: &'a BaselineReference,
    ) -> Self {
        Self {
            config,
            estimator,
            baseline,
        }
    }

    /// Evaluate every window of `recording` and collect the emitted rows in
    /// window order.
    pub fn run(&self, subject_id: usize, recording: &Recording) -> Result<(Vec<ResultRow>, WindowStats)> {
        let fs = recording.sampling_rate();
        let windows = partition_windows(recording.num_samples(), self.config.window_samples(fs));
        let resolved = ChannelResolver::new(recording.channels(), self.config.match_case_insensitive)
            .resolve_regions(&self.config.regions);

        let outcomes: Vec<Result<WindowOutcome>> = if self.config.parallel {
            windows
                .par_iter()
                .map(|w| self.evaluate(subject_id, recording, &resolved, *w))
                .collect()
        } else {
            windows
                .iter()
                .map(|w| self.evaluate(subject_id, recording, &resolved, *w))
                .collect()
        };

        let mut stats = WindowStats::default();
        let mut rows = Vec::with_capacity(windows.len());
        for outcome in outcomes {
            let outcome = outcome?;
            stats.record(&outcome);
            if let WindowOutcome::Emitted(row) = outcome {
                rows.push(row);
            }
        }

        log::debug!(
            "Subject {}: {} windows, {} emitted, {} too short, {} without band bins",
            subject_id,
            stats.total,
            stats.emitted,
            stats.too_short,
            stats.no_band_bins
        );
        Ok((rows, stats))
    }

    /// Run one window through the skip rules and, if it survives, build its row.
    pub fn evaluate(
        &self,
        subject_id: usize,
        recording: &Recording,
        resolved: &ResolvedRegions,
        window: Window,
    ) -> Result<WindowOutcome> {
        let fs = recording.sampling_rate();
        if (window.len() as f64) < fs {
            log::debug!("Window {} too short ({} samples)", window.index, window.len());
            return Ok(WindowOutcome::TooShort);
        }

        let segment = recording.data().slice_move(s![.., window.start..window.end]);
        let window_len = effective_window(self.config.window_samples(fs), window.len());
        let spectrum = self.estimator.estimate(segment, fs, window_len)?;

        let band_bins = Band::ALL.map(|band| spectrum.band_bins(self.config.bands.range(band)));
        if band_bins.iter().any(|bins| bins.is_empty()) {
            log::debug!("Window {} has a band without frequency bins", window.index);
            return Ok(WindowOutcome::NoBandBins);
        }

        let [theta, alpha, beta] = [0, 1, 2].map(|i| {
            let band = Band::ALL[i];
            let region = self.config.pairing.region_for(band);
            let raw = self.band_power(&spectrum, resolved.get(region), &band_bins[i]);
            match self.baseline.get(region, band) {
                ReferenceValue::Power(reference) => raw / reference,
                ReferenceValue::Insufficient(_) => f64::NAN,
            }
        });
        let indices = CognitiveIndices::from_normalized(theta, alpha, beta);

        Ok(WindowOutcome::Emitted(ResultRow {
            subject_id,
            window: window.index,
            start_s: window.start_secs(fs),
            end_s: window.end_secs(fs),
            theta_norm: theta,
            alpha_norm: alpha,
            beta_norm: beta,
            engagement_index: indices.engagement,
            task_load_index: indices.task_load,
            fatigue_index: indices.fatigue,
        }))
    }

    fn band_power(&self, spectrum: &Spectrum, rows: &[usize], bins: &[usize]) -> f64 {
        self.config
            .window_estimator
            .reduce(&spectrum.select(rows, bins))
            .unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_exact_cover() {
        for (total, len) in [(1000, 250), (1003, 250), (10, 20), (0, 5), (7, 1)] {
            let windows = partition_windows(total, len);
            let mut cursor = 0;
            for (i, w) in windows.iter().enumerate() {
                assert_eq!(w.index, i + 1);
                assert_eq!(w.start, cursor);
                assert!(w.end > w.start);
                assert!(w.len() <= len);
                cursor = w.end;
            }
            assert_eq!(cursor, total);
        }
        assert_eq!(partition_windows(1003, 250).len(), 5);
        assert!(partition_windows(100, 0).is_empty());
    }

    #[test]
    fn test_indices_by_hand() {
        let idx = CognitiveIndices::from_normalized(1.0, 1.0, 1.0);
        assert_eq!(idx.task_load, 1.0);
        assert_eq!(idx.fatigue, 1.0);
        assert_eq!(idx.engagement, 0.5);

        let idx = CognitiveIndices::from_normalized(2.0, 0.5, 3.0);
        assert_eq!(idx.task_load, 4.0);
        assert_eq!(idx.fatigue, 0.25);
        assert_eq!(idx.engagement, 3.0 / 2.5);
    }

    #[test]
    fn test_zero_denominators_are_nan_independently() {
        let idx = CognitiveIndices::from_normalized(1.0, 0.0, 2.0);
        assert!(idx.task_load.is_nan());
        assert_eq!(idx.engagement, 2.0);
        assert_eq!(idx.fatigue, 0.0);

        let idx = CognitiveIndices::from_normalized(0.0, 0.0, 2.0);
        assert!(idx.task_load.is_nan());
        assert!(idx.engagement.is_nan());
        assert!(idx.fatigue.is_nan());

        let idx = CognitiveIndices::from_normalized(f64::NAN, 1.0, 1.0);
        assert!(idx.task_load.is_nan());
        assert!(idx.engagement.is_nan());
        assert!(idx.fatigue.is_nan());
    }
}
