//! Power spectral density estimation.
//!
//! The pipeline only depends on the [`SpectralEstimator`] contract:
//! a [channels × samples] segment, a sampling rate and a window length go in,
//! frequency bin centers and a [channels × bins] power matrix come out.
//! [`WelchEstimator`] is the production implementation.

use crate::error::{CogLoadError, Result};
use crate::taxonomy::BandRange;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::cell::RefCell;
use std::f64::consts::PI;
use std::sync::Arc;

// Thread-local FFT planner, plans are cached per thread
thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Frequency bins and per-channel power for one segment
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    /// [channels × bins]
    pub power: Array2<f64>,
}

impl Spectrum {
    pub fn num_bins(&self) -> usize {
        self.frequencies.len()
    }

    pub fn band_bins(&self, range: BandRange) -> Vec<usize> {
        range.select_bins(&self.frequencies)
    }

    /// Flatten the power values at `rows` × `bins`.
    pub fn select(&self, rows: &[usize], bins: &[usize]) -> Vec<f64> {
        let mut values = Vec::with_capacity(rows.len() * bins.len());
        for &row in rows {
            for &bin in bins {
                values.push(self.power[[row, bin]]);
            }
        }
        values
    }
}

/// Segment in, spectrum out.
pub trait SpectralEstimator: Send + Sync {
    /// Estimate the PSD of every row of `segment`.
    ///
    /// `window_len` is the per-segment length in samples; implementations
    /// must accept values larger than the segment and shrink to it.
    fn estimate(
        &self,
        segment: ArrayView2<'_, f64>,
        sampling_rate: f64,
        window_len: usize,
    ) -> Result<Spectrum>;
}

/// The window length actually used for a segment of `segment_len` samples.
pub fn effective_window(configured: usize, segment_len: usize) -> usize {
    configured.min(segment_len)
}

/// Welch's averaged periodogram
///
/// Periodic Hann window, 50% overlap, per-segment mean removal, one-sided
/// density scaling (V²/Hz) and mean averaging. The FFT length equals the
/// window length.
#[derive(Debug, Clone, Default)]
pub struct WelchEstimator {
    parallel: bool,
}

impl WelchEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate channels on the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn hann_periodic(n: usize) -> Vec<f64> {
        if n == 1 {
            return vec![1.0];
        }
        (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
            .collect()
    }

    fn channel_psd(
        signal: ArrayView1<'_, f64>,
        window: &[f64],
        fft: &Arc<dyn Fft<f64>>,
        scale: f64,
    ) -> Vec<f64> {
        let nperseg = window.len();
        let step = nperseg - nperseg / 2;
        let num_segments = (signal.len() - nperseg) / step + 1;
        let num_bins = nperseg / 2 + 1;

        let mut acc = vec![0.0; num_bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];

        for seg in 0..num_segments {
            let start = seg * step;
            let chunk = signal.slice(ndarray::s![start..start + nperseg]);
            let mean = chunk.sum() / nperseg as f64;

            for (slot, (&x, &w)) in buffer.iter_mut().zip(chunk.iter().zip(window)) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            fft.process(&mut buffer);

            for (k, value) in acc.iter_mut().enumerate() {
                *value += buffer[k].norm_sqr();
            }
        }

        // One-sided: double everything except DC and, for even lengths, Nyquist
        let last_doubled = if nperseg % 2 == 0 {
            num_bins - 1
        } else {
            num_bins
        };
        for (k, value) in acc.iter_mut().enumerate() {
            *value *= scale / num_segments as f64;
            if k > 0 && k < last_doubled {
                *value *= 2.0;
            }
        }
        acc
    }
}

impl SpectralEstimator for WelchEstimator {
    fn estimate(
        &self,
        segment: ArrayView2<'_, f64>,
        sampling_rate: f64,
        window_len: usize,
    ) -> Result<Spectrum> {
        let num_samples = segment.ncols();
        if num_samples == 0 {
            return Err(CogLoadError::Spectral("segment has no samples".to_string()));
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(CogLoadError::Spectral(format!(
                "invalid sampling rate {}",
                sampling_rate
            )));
        }
        let nperseg = effective_window(window_len, num_samples);
        if nperseg == 0 {
            return Err(CogLoadError::Spectral("window length is zero".to_string()));
        }

        let window = Self::hann_periodic(nperseg);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (sampling_rate * window_power);

        let fft = FFT_PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(nperseg));

        let num_bins = nperseg / 2 + 1;
        let frequencies: Vec<f64> = (0..num_bins)
            .map(|k| k as f64 * sampling_rate / nperseg as f64)
            .collect();

        let rows: Vec<ArrayView1<'_, f64>> = segment.outer_iter().collect();
        let per_channel: Vec<Vec<f64>> = if self.parallel {
            rows.par_iter()
                .map(|row| Self::channel_psd(*row, &window, &fft, scale))
                .collect()
        } else {
            rows.iter()
                .map(|row| Self::channel_psd(*row, &window, &fft, scale))
                .collect()
        };

        let num_channels = per_channel.len();
        let flat: Vec<f64> = per_channel.into_iter().flatten().collect();
        let power = Array2::from_shape_vec((num_channels, num_bins), flat)
            .map_err(|e| CogLoadError::Spectral(e.to_string()))?;

        Ok(Spectrum { frequencies, power })
    }
}
