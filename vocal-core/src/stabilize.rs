//! # Pitch Stabilization Module
//!
//! Smooths a stream of raw per-frame estimates into a displayable,
//! jitter-resistant pitch and a stability score.
//!
//! The stabilizer is inherently stateful and sequential: each output
//! depends on the previous ones, so one instance is owned by exactly one
//! live stream and is never shared across threads. Replaying a recorded
//! stream through a fresh instance is deterministic, which is how the
//! tests below exercise it.

use crate::config::StabilizerConfig;
use crate::note::{self, NoteLabel};
use crate::pitch::PitchEstimate;
use std::collections::VecDeque;

/// A smoothed live pitch with its note label and stability score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizedPitch {
    /// Smoothed frequency in Hz, 0.0 when unvoiced.
    pub frequency_hz: f32,
    pub voiced: bool,
    /// Note label of the smoothed pitch, `None` for a rest.
    pub note: Option<NoteLabel>,
    /// Share of the recent note window agreeing with the newest label,
    /// 0-100.
    pub stability: f32,
}

/// Per-session smoothing state, created at stream start and destroyed (or
/// [`reset`](PitchStabilizer::reset)) at stream stop.
#[derive(Debug)]
pub struct PitchStabilizer {
    config: StabilizerConfig,
    /// Recently accepted (post-blend) pitches.
    history: VecDeque<f32>,
    last_accepted: Option<f32>,
    smoothed: Option<f32>,
    /// Recent note labels of the smoothed pitch; `None` entries are rests.
    note_window: VecDeque<Option<NoteLabel>>,
    stable_note: Option<NoteLabel>,
    stability: f32,
}

impl PitchStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        assert!(config.history_len > 0, "history length must be positive");
        assert!(config.note_window > 0, "note window must be positive");
        Self {
            history: VecDeque::with_capacity(config.history_len),
            note_window: VecDeque::with_capacity(config.note_window),
            last_accepted: None,
            smoothed: None,
            stable_note: None,
            stability: 0.0,
            config,
        }
    }

    /// Folds one raw estimate into the smoothing state.
    ///
    /// Voiced estimates go through three stages:
    /// 1. Outlier handling: a jump of more than the configured fraction
    ///    from the last accepted pitch is pulled toward the running median
    ///    (`0.7 * median + 0.3 * new`); small changes blend with the
    ///    running average instead (`0.8 * average + 0.2 * new`).
    /// 2. A slower exponential smoother on top of the accepted value.
    /// 3. The note label of the smoothed pitch feeds the stability window.
    ///
    /// An unvoiced estimate resets the pitch state so the next phrase
    /// attacks cleanly instead of being dragged toward the old pitch; it
    /// still pushes a rest into the note window, so stability decays
    /// through silence.
    pub fn process(&mut self, estimate: &PitchEstimate) -> StabilizedPitch {
        if !estimate.voiced {
            self.history.clear();
            self.last_accepted = None;
            self.smoothed = None;
            self.push_label(None);
            return StabilizedPitch {
                frequency_hz: 0.0,
                voiced: false,
                note: None,
                stability: self.stability,
            };
        }

        let raw = estimate.frequency_hz;
        let accepted = match self.last_accepted {
            None => raw,
            Some(prev) => {
                let change = ((raw - prev) / prev).abs();
                if change > self.config.outlier_fraction {
                    0.7 * self.median() + 0.3 * raw
                } else {
                    0.8 * self.average() + 0.2 * raw
                }
            }
        };

        if self.history.len() == self.config.history_len {
            self.history.pop_front();
        }
        self.history.push_back(accepted);
        self.last_accepted = Some(accepted);

        let smoothed = match self.smoothed {
            None => accepted,
            Some(prev) => {
                prev * self.config.smoothing + accepted * (1.0 - self.config.smoothing)
            }
        };
        self.smoothed = Some(smoothed);

        let label = note::note_from_hz(smoothed);
        self.push_label(label);

        StabilizedPitch {
            frequency_hz: smoothed,
            voiced: true,
            note: label,
            stability: self.stability,
        }
    }

    /// The last note that held the stability threshold, if any.
    pub fn stable_note(&self) -> Option<NoteLabel> {
        self.stable_note
    }

    /// Current stability score, 0-100.
    pub fn stability(&self) -> f32 {
        self.stability
    }

    /// Clears all state for reuse by a new stream.
    pub fn reset(&mut self) {
        self.history.clear();
        self.note_window.clear();
        self.last_accepted = None;
        self.smoothed = None;
        self.stable_note = None;
        self.stability = 0.0;
    }

    fn push_label(&mut self, label: Option<NoteLabel>) {
        if self.note_window.len() == self.config.note_window {
            self.note_window.pop_front();
        }
        self.note_window.push_back(label);

        // Stability counts how much of the window agrees with the newest
        // label; the window size is the configured one, so a freshly
        // started stream ramps up instead of reading 100 immediately.
        let matching = self
            .note_window
            .iter()
            .filter(|entry| match (entry, &label) {
                (Some(a), Some(b)) => a.same_note(b),
                (None, None) => true,
                _ => false,
            })
            .count();
        self.stability = matching as f32 / self.config.note_window as f32 * 100.0;

        if self.stability >= self.config.stable_threshold {
            if let Some(label) = label {
                self.stable_note = Some(label);
            }
        }
    }

    fn median(&self) -> f32 {
        let mut sorted: Vec<f32> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted[sorted.len() / 2]
    }

    fn average(&self) -> f32 {
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }
}
