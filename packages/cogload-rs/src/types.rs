use crate::error::{CogLoadError, Result};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Condition label written to every exported row
pub const CONDITION_LABEL: &str = "Experimental";

/// Multi-channel recording held in memory
///
/// `data` is laid out as [channels × samples]; its row count always equals
/// the number of channel labels.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<String>,
    data: Array2<f64>,
    sampling_rate: f64,
}

impl Recording {
    pub fn new(channels: Vec<String>, data: Array2<f64>, sampling_rate: f64) -> Result<Self> {
        if data.nrows() != channels.len() {
            return Err(CogLoadError::InvalidRecording(format!(
                "{} channel labels but {} data rows",
                channels.len(),
                data.nrows()
            )));
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(CogLoadError::InvalidRecording(format!(
                "Sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        let mut seen = HashSet::with_capacity(channels.len());
        for label in &channels {
            if !seen.insert(label.as_str()) {
                return Err(CogLoadError::InvalidRecording(format!(
                    "Duplicate channel label '{}'",
                    label
                )));
            }
        }

        Ok(Self {
            channels,
            data,
            sampling_rate,
        })
    }

    /// Build a recording from per-channel sample vectors.
    pub fn from_rows(channels: Vec<String>, rows: Vec<Vec<f64>>, sampling_rate: f64) -> Result<Self> {
        let num_samples = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != num_samples) {
            return Err(CogLoadError::InvalidRecording(format!(
                "Channel {} has {} samples, expected {}",
                idx,
                row.len(),
                num_samples
            )));
        }

        let num_channels = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((num_channels, num_samples), flat)
            .map_err(|e| CogLoadError::InvalidRecording(e.to_string()))?;
        Self::new(channels, data, sampling_rate)
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_samples() as f64 / self.sampling_rate
    }

    /// Replace the sampling rate, keeping the samples untouched.
    pub fn with_sampling_rate(self, sampling_rate: f64) -> Result<Self> {
        Self::new(self.channels, self.data, sampling_rate)
    }

    /// Keep only the first `max_channels` channels.
    pub fn limit_channels(mut self, max_channels: usize) -> Self {
        if max_channels < self.channels.len() {
            self.channels.truncate(max_channels);
            self.data = self.data.slice(s![..max_channels, ..]).to_owned();
        }
        self
    }

    /// Copy of the first `num_samples` samples (clamped to the recording length).
    pub fn prefix(&self, num_samples: usize) -> Recording {
        let end = num_samples.min(self.num_samples());
        Recording {
            channels: self.channels.clone(),
            data: self.data.slice(s![.., ..end]).to_owned(),
            sampling_rate: self.sampling_rate,
        }
    }
}

/// Contiguous slice `[start, end)` of a task recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// 1-based position in the recording
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn start_secs(&self, sampling_rate: f64) -> f64 {
        self.start as f64 / sampling_rate
    }

    pub fn end_secs(&self, sampling_rate: f64) -> f64 {
        self.end as f64 / sampling_rate
    }
}

/// One emitted analysis window
///
/// Undefined values are stored as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub subject_id: usize,
    pub window: usize,
    pub start_s: f64,
    pub end_s: f64,
    pub theta_norm: f64,
    pub alpha_norm: f64,
    pub beta_norm: f64,
    pub engagement_index: f64,
    pub task_load_index: f64,
    pub fatigue_index: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recording_shape_mismatch() {
        let data = Array2::<f64>::zeros((3, 10));
        let result = Recording::new(labels(&["Fz", "Pz"]), data, 250.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_recording_rejects_duplicates_and_bad_rate() {
        let data = Array2::<f64>::zeros((2, 10));
        assert!(Recording::new(labels(&["Fz", "Fz"]), data.clone(), 250.0).is_err());
        assert!(Recording::new(labels(&["Fz", "Pz"]), data, 0.0).is_err());
    }

    #[test]
    fn test_from_rows_ragged() {
        let rows = vec![vec![0.0; 10], vec![0.0; 9]];
        assert!(Recording::from_rows(labels(&["Fz", "Pz"]), rows, 250.0).is_err());
    }

    #[test]
    fn test_prefix_and_limit() {
        let rows = vec![
            (0..100).map(|i| i as f64).collect(),
            (0..100).map(|i| -(i as f64)).collect(),
            vec![1.0; 100],
        ];
        let rec = Recording::from_rows(labels(&["Fz", "Pz", "Cz"]), rows, 50.0).unwrap();
        assert_eq!(rec.duration_secs(), 2.0);

        let head = rec.prefix(25);
        assert_eq!(head.num_samples(), 25);
        assert_eq!(head.data()[[1, 24]], -24.0);
        assert_eq!(rec.prefix(1_000).num_samples(), 100);

        let limited = rec.limit_channels(2);
        assert_eq!(limited.channels(), &labels(&["Fz", "Pz"])[..]);
        assert_eq!(limited.data().nrows(), 2);
    }

    #[test]
    fn test_window_seconds() {
        let w = Window {
            index: 2,
            start: 500,
            end: 1000,
        };
        assert_eq!(w.len(), 500);
        assert_eq!(w.start_secs(250.0), 2.0);
        assert_eq!(w.end_secs(250.0), 4.0);
    }
}
