//! # Pitch Detection Module
//!
//! Monophonic fundamental-frequency estimation from conditioned audio
//! frames, using normalized autocorrelation.
//!
//! ## Features
//! - RMS noise gate so quiet frames are unvoiced without further work
//! - Autocorrelation computed via FFT (Wiener-Khinchin) instead of the
//!   direct O(N^2) sum; plans and scratch buffers are allocated once per
//!   detector and reused for every frame
//! - Lag search restricted to the configured frequency range
//! - Parabolic interpolation for sub-sample period accuracy
//! - Clarity (peak over zero-lag ratio) exposed so callers can threshold
//!   on voicing quality rather than RMS alone

use crate::config::EstimatorConfig;
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// The result of analyzing a single frame.
///
/// `frequency_hz == 0.0` and `voiced == false` both encode "no pitch"; a
/// frame is never voiced with zero frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Detected fundamental frequency in Hz, 0.0 when unvoiced.
    pub frequency_hz: f32,
    /// Whether the frame contains a detectable periodic pitch.
    pub voiced: bool,
    /// Root-mean-square level of the analyzed frame.
    pub rms: f32,
    /// Autocorrelation peak relative to the zero-lag value, 0.0 to 1.0.
    pub clarity: f32,
}

impl PitchEstimate {
    /// An unvoiced estimate carrying only the measured level.
    pub fn unvoiced(rms: f32) -> Self {
        Self {
            frequency_hz: 0.0,
            voiced: false,
            rms,
            clarity: 0.0,
        }
    }
}

/// Autocorrelation pitch detector for fixed-size frames.
///
/// Owns the FFT plans and all scratch buffers so the per-frame hot path
/// allocates nothing. One detector serves one stream; batch analysis
/// creates one per worker thread.
pub struct PitchDetector {
    sample_rate: u32,
    frame_size: usize,
    padded_len: usize,
    /// Shortest lag searched, from the highest frequency of interest.
    min_lag: usize,
    /// Longest lag searched, from the lowest frequency of interest,
    /// clamped to half the frame.
    max_lag: usize,
    silence_rms: f32,
    clarity_threshold: f32,
    fft: Arc<dyn Fft<f32>>,
    inv_fft: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    autocorr: Vec<f32>,
}

impl PitchDetector {
    /// Builds a detector for one pipeline instance.
    ///
    /// # Panics
    /// * If `sample_rate` is zero
    /// * If `frame_size` is smaller than four samples
    /// * If the configured frequency range is empty or non-positive
    pub fn new(sample_rate: u32, frame_size: usize, config: &EstimatorConfig) -> Self {
        assert!(sample_rate > 0, "sample rate must be positive");
        assert!(frame_size >= 4, "frame size must be at least 4 samples");
        assert!(
            config.min_freq_hz > 0.0 && config.min_freq_hz < config.max_freq_hz,
            "invalid frequency range {}..{}",
            config.min_freq_hz,
            config.max_freq_hz
        );

        // Zero-padding to twice the frame turns the FFT's circular
        // correlation into the linear autocorrelation we need.
        let padded_len = frame_size * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(padded_len);
        let inv_fft = planner.plan_fft_inverse(padded_len);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(inv_fft.get_inplace_scratch_len());

        let min_lag = (sample_rate as f32 / config.max_freq_hz).floor() as usize;
        let max_lag = ((sample_rate as f32 / config.min_freq_hz).floor() as usize)
            .min(frame_size / 2);

        Self {
            sample_rate,
            frame_size,
            padded_len,
            min_lag,
            max_lag,
            silence_rms: config.silence_rms,
            clarity_threshold: config.clarity_threshold,
            fft,
            inv_fft,
            spectrum: vec![Complex::default(); padded_len],
            scratch: vec![Complex::default(); scratch_len],
            autocorr: vec![0.0; frame_size / 2 + 2],
        }
    }

    /// Frame length this detector was built for.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Estimates the fundamental frequency of one conditioned frame.
    ///
    /// # Arguments
    /// * `frame` - Conditioned samples, exactly `frame_size` long
    ///
    /// # Returns
    /// A voiced estimate with frequency and clarity, or an unvoiced one for
    /// silence, noise, and frames too short to hold a period of the lowest
    /// searched frequency.
    ///
    /// # Panics
    /// * If `frame` does not match the configured frame size
    pub fn detect(&mut self, frame: &[f32]) -> PitchEstimate {
        assert_eq!(
            frame.len(),
            self.frame_size,
            "frame length must match the configured frame size"
        );

        // --- Noise gate ---
        let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
        if rms < self.silence_rms {
            return PitchEstimate::unvoiced(rms);
        }

        // The search needs room for at least one interior local maximum.
        if self.min_lag.max(1) + 1 > self.max_lag {
            return PitchEstimate::unvoiced(rms);
        }

        // --- Normalized autocorrelation ---
        // r[lag] = (1 / (N - lag)) * sum x[i] * x[i+lag], on the RMS-
        // normalized frame, computed as IFFT(|FFT(x)|^2) over the padded
        // buffer.
        for (slot, &sample) in self.spectrum.iter_mut().zip(frame) {
            *slot = Complex {
                re: sample / rms,
                im: 0.0,
            };
        }
        for slot in self.spectrum[self.frame_size..].iter_mut() {
            *slot = Complex::default();
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);
        for bin in self.spectrum.iter_mut() {
            *bin = Complex {
                re: bin.norm_sqr(),
                im: 0.0,
            };
        }
        self.inv_fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // rustfft does not normalize, so a forward+inverse pass scales by
        // the transform length.
        let fft_norm = 1.0 / self.padded_len as f32;
        for lag in 0..=self.max_lag + 1 {
            self.autocorr[lag] =
                self.spectrum[lag].re * fft_norm / (self.frame_size - lag) as f32;
        }

        let r0 = self.autocorr[0];
        if r0 <= f32::EPSILON {
            return PitchEstimate::unvoiced(rms);
        }

        // --- Peak pick ---
        // Largest local maximum in the lag range whose value clears the
        // clarity threshold.
        let threshold = r0 * self.clarity_threshold;
        let mut best: Option<usize> = None;
        for lag in self.min_lag.max(1)..=self.max_lag {
            let r = self.autocorr[lag];
            if r >= self.autocorr[lag - 1]
                && r >= self.autocorr[lag + 1]
                && r > threshold
                && best.is_none_or(|b| r > self.autocorr[b])
            {
                best = Some(lag);
            }
        }
        let Some(period) = best else {
            return PitchEstimate::unvoiced(rms);
        };

        // --- Parabolic interpolation for sub-sample accuracy ---
        let y1 = self.autocorr[period - 1];
        let y2 = self.autocorr[period];
        let y3 = self.autocorr[period + 1];
        let a = (y1 - 2.0 * y2 + y3) / 2.0;
        let b = (y3 - y1) / 2.0;
        let mut refined = period as f32;
        if a.abs() > 1e-4 {
            let offset = -b / (2.0 * a);
            if offset.abs() < 1.0 {
                refined += offset;
            }
        }

        let frequency = self.sample_rate as f32 / refined;
        if !frequency.is_finite() || frequency <= 0.0 {
            return PitchEstimate::unvoiced(rms);
        }

        PitchEstimate {
            frequency_hz: frequency,
            voiced: true,
            rms,
            clarity: (y2 / r0).clamp(0.0, 1.0),
        }
    }
}
