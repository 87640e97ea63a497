//! # Batch Song Analysis Module
//!
//! Turns a decoded waveform (a vocal stem, typically) into a note
//! timeline. The per-frame stage (conditioning, pitch detection, note
//! mapping) is pure and runs in parallel across worker threads; the
//! segmentation fold that follows is sequential over the time-ordered
//! results.
//!
//! Frame estimates are stamped at the frame center, so a note onset lands
//! within one hop of its true time.

use serde::{Deserialize, Serialize};
use std::thread;

use crate::config::{EstimatorConfig, PipelineConfig, SegmenterConfig};
use crate::note;
use crate::pitch::{PitchDetector, PitchEstimate};
use crate::preprocess::Preprocessor;
use crate::segment::{SegmentKind, Segmenter, Timeline};

/// Parameters for one batch analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub pipeline: PipelineConfig,
    pub estimator: EstimatorConfig,
    pub segmenter: SegmenterConfig,
    /// Kind recorded on voiced segments (which stem this waveform is).
    pub kind: SegmentKind,
    /// Worker threads for the per-frame stage; 0 means one per available
    /// core.
    pub threads: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            estimator: EstimatorConfig::default(),
            segmenter: SegmenterConfig::default(),
            kind: SegmentKind::Vocal,
            threads: 0,
        }
    }
}

/// The result of analyzing one recording: the timeline plus
/// whole-recording metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongAnalysis {
    pub timeline: Timeline,
    /// Length of the analyzed waveform in seconds.
    pub total_duration: f32,
    pub segment_count: usize,
}

/// Analyzes a whole decoded waveform into a note timeline.
///
/// Slices the waveform into overlapping frames, estimates the pitch of
/// each frame concurrently, then folds the time-ordered estimates into
/// segments. A trailing partial frame is ignored. Deterministic: the same
/// waveform always produces the same timeline regardless of thread count.
///
/// # Arguments
/// * `samples` - Decoded mono waveform in [-1, 1]
/// * `sample_rate` - Waveform sample rate in Hz
///
/// # Panics
/// * If `sample_rate` is zero
pub fn analyze_waveform(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalyzerConfig,
) -> SongAnalysis {
    assert!(sample_rate > 0, "sample rate must be positive");

    let frame_size = config.pipeline.frame_size;
    let hop = config.pipeline.hop_size;
    let total_duration = samples.len() as f32 / sample_rate as f32;

    let frame_count = if samples.len() >= frame_size {
        (samples.len() - frame_size) / hop + 1
    } else {
        0
    };

    let estimates = estimate_frames(samples, sample_rate, config, frame_count);

    let mut segmenter = Segmenter::new(config.segmenter.clone(), config.kind);
    for (index, estimate) in estimates.iter().enumerate() {
        let time = (index * hop + frame_size / 2) as f32 / sample_rate as f32;
        let label = if estimate.voiced {
            note::note_from_hz(estimate.frequency_hz)
        } else {
            None
        };
        segmenter.push(time, estimate, label);
    }
    let timeline = segmenter.finish(total_duration);

    SongAnalysis {
        segment_count: timeline.len(),
        total_duration,
        timeline,
    }
}

/// Runs the pure per-frame stage, fanning contiguous frame ranges out
/// across scoped worker threads. Each worker owns its own conditioner and
/// detector, and chunk results come back in index order, so the output is
/// identical to a single-threaded pass.
fn estimate_frames(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalyzerConfig,
    frame_count: usize,
) -> Vec<PitchEstimate> {
    if frame_count == 0 {
        return Vec::new();
    }

    let workers = if config.threads > 0 {
        config.threads
    } else {
        thread::available_parallelism().map_or(1, |n| n.get())
    };
    let workers = workers.min(frame_count);
    let chunk_len = frame_count.div_ceil(workers);

    let frame_size = config.pipeline.frame_size;
    let hop = config.pipeline.hop_size;

    let chunks: Vec<Vec<PitchEstimate>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let start = worker * chunk_len;
                let end = ((worker + 1) * chunk_len).min(frame_count);
                scope.spawn(move || {
                    let pre = Preprocessor::new(sample_rate, &config.pipeline);
                    let mut detector =
                        PitchDetector::new(sample_rate, frame_size, &config.estimator);
                    let mut conditioned = vec![0.0f32; frame_size];

                    (start..end)
                        .map(|index| {
                            let offset = index * hop;
                            pre.process_into(
                                &samples[offset..offset + frame_size],
                                &mut conditioned,
                            );
                            detector.detect(&conditioned)
                        })
                        .collect()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("analysis worker panicked"))
            .collect()
    });

    chunks.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::NoteName;
    use std::f32::consts::PI;

    fn tone(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn steady_tone_yields_one_note_segment() {
        let samples = tone(440.0, 44100, 1.0);
        let analysis = analyze_waveform(&samples, 44100, &AnalyzerConfig::default());

        let notes: Vec<_> = analysis
            .timeline
            .segments()
            .iter()
            .filter(|s| !s.is_rest())
            .collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note.unwrap().name, NoteName::A);
        assert_eq!(notes[0].note.unwrap().octave, 4);
        assert!((notes[0].frequency_hz - 440.0).abs() < 4.4);
        assert_eq!(notes[0].kind, SegmentKind::Vocal);

        assert!((analysis.total_duration - 1.0).abs() < 1e-3);
        assert_eq!(analysis.segment_count, analysis.timeline.len());
    }

    #[test]
    fn buffer_shorter_than_one_frame_is_empty() {
        let samples = tone(440.0, 44100, 0.05); // ~2205 samples < 4096
        let analysis = analyze_waveform(&samples, 44100, &AnalyzerConfig::default());
        assert!(analysis.timeline.is_empty());
        assert!((analysis.total_duration - 0.05).abs() < 1e-3);
    }

    #[test]
    fn thread_count_does_not_change_the_result() {
        let mut samples = tone(293.66, 44100, 0.8);
        samples.extend(tone(440.0, 44100, 0.7));

        let single = analyze_waveform(
            &samples,
            44100,
            &AnalyzerConfig {
                threads: 1,
                ..AnalyzerConfig::default()
            },
        );
        let parallel = analyze_waveform(
            &samples,
            44100,
            &AnalyzerConfig {
                threads: 4,
                ..AnalyzerConfig::default()
            },
        );
        assert_eq!(single, parallel);
    }

    #[test]
    fn instrumental_kind_is_recorded() {
        let samples = tone(440.0, 44100, 0.5);
        let config = AnalyzerConfig {
            kind: SegmentKind::Instrumental,
            estimator: EstimatorConfig::instrumental(),
            ..AnalyzerConfig::default()
        };
        let analysis = analyze_waveform(&samples, 44100, &config);
        let notes: Vec<_> = analysis
            .timeline
            .segments()
            .iter()
            .filter(|s| !s.is_rest())
            .collect();
        assert!(!notes.is_empty());
        assert!(notes.iter().all(|s| s.kind == SegmentKind::Instrumental));
    }
}
