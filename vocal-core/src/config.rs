//! # Pipeline Configuration
//!
//! Tunable parameters for every stage of the analysis pipeline. The defaults
//! come from the vocal tuning of the practice application; none of them is a
//! load-bearing invariant, so they are exposed as plain struct fields rather
//! than hard-coded constants.
//!
//! Each stage takes its own config struct:
//! - [`PipelineConfig`] - framing and signal conditioning
//! - [`EstimatorConfig`] - autocorrelation pitch search
//! - [`StabilizerConfig`] - live pitch smoothing
//! - [`SegmenterConfig`] - note segmentation
//! - [`ScorerConfig`] - pitch comparison and session scoring

/// Framing and signal-conditioning parameters.
///
/// Frame length is constant per pipeline instance; hop size is a fixed
/// fraction of it (defaults give 75% overlap).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// Sample advance between consecutive frames.
    pub hop_size: usize,
    /// High-pass cutoff removing DC offset and sub-vocal rumble, in Hz.
    pub highpass_cutoff_hz: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            hop_size: 1024,
            highpass_cutoff_hz: 80.0,
        }
    }
}

impl PipelineConfig {
    /// Duration of one frame at the given sample rate, in seconds.
    pub fn frame_duration(&self, sample_rate: u32) -> f32 {
        self.frame_size as f32 / sample_rate as f32
    }

    /// Duration of one hop at the given sample rate, in seconds.
    pub fn hop_duration(&self, sample_rate: u32) -> f32 {
        self.hop_size as f32 / sample_rate as f32
    }
}

/// Parameters for the autocorrelation pitch search.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Lowest frequency considered, in Hz.
    pub min_freq_hz: f32,
    /// Highest frequency considered, in Hz.
    pub max_freq_hz: f32,
    /// Frames with RMS below this are unvoiced without further analysis.
    pub silence_rms: f32,
    /// An autocorrelation peak must exceed this fraction of the zero-lag
    /// value to count as a pitch.
    pub clarity_threshold: f32,
}

impl Default for EstimatorConfig {
    /// Defaults tuned for singing voice (80-1000 Hz).
    fn default() -> Self {
        Self {
            min_freq_hz: 80.0,
            max_freq_hz: 1000.0,
            silence_rms: 0.001,
            clarity_threshold: 0.3,
        }
    }
}

impl EstimatorConfig {
    /// A wider search range for general musical content (instrument stems,
    /// whistling) where fundamentals run well above the vocal range.
    pub fn instrumental() -> Self {
        Self {
            max_freq_hz: 4000.0,
            ..Self::default()
        }
    }
}

/// Parameters for live pitch smoothing and stability tracking.
#[derive(Debug, Clone)]
pub struct StabilizerConfig {
    /// Number of accepted raw estimates kept for median/average blending.
    pub history_len: usize,
    /// Fractional change from the last accepted pitch above which a new
    /// estimate is treated as an outlier.
    pub outlier_fraction: f32,
    /// Exponential smoothing factor; higher values trade attack latency for
    /// less jitter.
    pub smoothing: f32,
    /// Number of recent note labels used for the stability score.
    pub note_window: usize,
    /// Minimum stability (0-100) before the stable note is updated.
    pub stable_threshold: f32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_len: 8,
            outlier_fraction: 0.02,
            smoothing: 0.92,
            note_window: 5,
            stable_threshold: 60.0,
        }
    }
}

/// Parameters for folding frame estimates into note segments.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Segments shorter than this are merged into a matching neighbor or
    /// dropped, in seconds.
    pub min_segment_duration: f32,
    /// Whether silent stretches appear as rest segments in the timeline.
    /// When false an all-silent stream produces an empty timeline.
    pub keep_rest_segments: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_segment_duration: 0.1,
            keep_rest_segments: true,
        }
    }
}

/// Parameters for the pitch comparison score curve and session aggregation.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Deviations up to this many cents score 100.
    pub perfect_cents: f32,
    /// Upper bound of the 70-100 band, in cents.
    pub good_cents: f32,
    /// Upper bound of the 40-70 band, in cents.
    pub ok_cents: f32,
    /// Deviation at which the score reaches zero, in cents.
    pub zero_cents: f32,
    /// Maximum comparison results retained per session; the oldest are
    /// evicted past this cap.
    pub history_cap: usize,
    /// Weight of average accuracy in the overall session score.
    pub accuracy_weight: f32,
    /// Weight of pitch stability in the overall session score.
    pub stability_weight: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            perfect_cents: 10.0,
            good_cents: 25.0,
            ok_cents: 50.0,
            zero_cents: 200.0,
            history_cap: 500,
            accuracy_weight: 0.7,
            stability_weight: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_overlap_is_75_percent() {
        let config = PipelineConfig::default();
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.hop_size, config.frame_size / 4);
    }

    #[test]
    fn frame_and_hop_durations() {
        let config = PipelineConfig::default();
        assert!((config.frame_duration(44100) - 0.0929).abs() < 1e-3);
        assert!((config.hop_duration(44100) - 0.0232).abs() < 1e-3);
    }

    #[test]
    fn instrumental_range_is_wider() {
        let vocal = EstimatorConfig::default();
        let instrumental = EstimatorConfig::instrumental();
        assert!(instrumental.max_freq_hz > vocal.max_freq_hz);
        assert_eq!(instrumental.min_freq_hz, vocal.min_freq_hz);
    }
}
