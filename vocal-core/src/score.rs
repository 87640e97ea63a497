//! # Pitch Comparison and Scoring Module
//!
//! Compares a live smoothed pitch against a reference target at the same
//! instant and aggregates the results into a session score. Expected
//! silence, missing voice, and off-pitch singing are all valid outcomes,
//! never errors.

use crate::config::ScorerConfig;
use crate::note;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Quality band of a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Perfect,
    Good,
    Ok,
    Poor,
    /// Target was silence and the user was silent.
    Silence,
    /// Target was silence but the user sang.
    ShouldBeSilent,
    /// Target had a note but no voice was detected.
    #[serde(rename = "no_voice_detected")]
    NoVoice,
}

/// One scored instant of a practice session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Session time in seconds.
    pub time: f32,
    /// User frequency in Hz, 0.0 when unvoiced.
    pub user_freq: f32,
    /// Target frequency in Hz, 0.0 for expected silence.
    pub target_freq: f32,
    /// Signed deviation in cents; 0.0 when either side is silent.
    pub cents_diff: f32,
    /// 0-100.
    pub score: f32,
    pub tier: ScoreTier,
}

/// Maps an absolute cents deviation onto the piecewise score curve.
///
/// 100 inside the perfect band, then linear 100-70 to the good bound,
/// linear 70-40 to the ok bound, then linear decay to 0 at `zero_cents`.
/// Non-increasing in the deviation by construction.
pub fn score_from_cents(abs_cents: f32, config: &ScorerConfig) -> f32 {
    if abs_cents <= config.perfect_cents {
        100.0
    } else if abs_cents <= config.good_cents {
        let band = (abs_cents - config.perfect_cents) / (config.good_cents - config.perfect_cents);
        100.0 - band * 30.0
    } else if abs_cents <= config.ok_cents {
        let band = (abs_cents - config.good_cents) / (config.ok_cents - config.good_cents);
        70.0 - band * 30.0
    } else {
        let band = (config.zero_cents - abs_cents) / (config.zero_cents - config.ok_cents);
        (band * 40.0).max(0.0)
    }
}

/// Compares one user pitch sample against the reference target.
///
/// # Arguments
/// * `user_freq` - Smoothed user frequency in Hz (ignored when unvoiced)
/// * `user_voiced` - Whether the user frame carried a pitch
/// * `target_freq` - Reference frequency in Hz, 0.0 for expected silence
/// * `time` - Session time in seconds, recorded on the result
pub fn compare_pitch(
    user_freq: f32,
    user_voiced: bool,
    target_freq: f32,
    time: f32,
    config: &ScorerConfig,
) -> ComparisonResult {
    // Expected silence is scored binary: you either rested or you didn't.
    if target_freq <= 0.0 {
        let (score, tier) = if user_voiced {
            (0.0, ScoreTier::ShouldBeSilent)
        } else {
            (100.0, ScoreTier::Silence)
        };
        return ComparisonResult {
            time,
            user_freq: if user_voiced { user_freq } else { 0.0 },
            target_freq: 0.0,
            cents_diff: 0.0,
            score,
            tier,
        };
    }

    if !user_voiced || user_freq <= 0.0 {
        return ComparisonResult {
            time,
            user_freq: 0.0,
            target_freq,
            cents_diff: 0.0,
            score: 0.0,
            tier: ScoreTier::NoVoice,
        };
    }

    let cents_diff = note::cents_between(user_freq, target_freq);
    let abs_cents = cents_diff.abs();
    let tier = if abs_cents <= config.perfect_cents {
        ScoreTier::Perfect
    } else if abs_cents <= config.good_cents {
        ScoreTier::Good
    } else if abs_cents <= config.ok_cents {
        ScoreTier::Ok
    } else {
        ScoreTier::Poor
    };

    ComparisonResult {
        time,
        user_freq,
        target_freq,
        cents_diff,
        score: score_from_cents(abs_cents, config),
        tier,
    }
}

/// Per-tier counts over a session history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub perfect: usize,
    pub good: usize,
    pub ok: usize,
    pub poor: usize,
    pub silence: usize,
    pub should_be_silent: usize,
    pub no_voice: usize,
}

impl TierCounts {
    fn add(&mut self, tier: ScoreTier) {
        match tier {
            ScoreTier::Perfect => self.perfect += 1,
            ScoreTier::Good => self.good += 1,
            ScoreTier::Ok => self.ok += 1,
            ScoreTier::Poor => self.poor += 1,
            ScoreTier::Silence => self.silence += 1,
            ScoreTier::ShouldBeSilent => self.should_be_silent += 1,
            ScoreTier::NoVoice => self.no_voice += 1,
        }
    }
}

/// Aggregate over a session's comparison history. Derived data: the history
/// itself is the source of truth, and the summary is recomputed from it on
/// demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionScore {
    /// Mean score over everything the user actually attempted (all tiers
    /// except `NoVoice`).
    pub average_score: f32,
    /// Share of attempts landing in the ok band or better (Perfect, Good,
    /// Ok, or a correct Silence), 0-100.
    pub accuracy_percent: f32,
    pub tier_counts: TierCounts,
    /// 100 minus the standard deviation of the absolute cents error over
    /// voiced comparisons, clamped to 0-100; 0.0 when nothing voiced was
    /// scored.
    pub pitch_stability: f32,
    /// Weighted blend of accuracy and stability; rewards consistency, not
    /// just momentary accuracy.
    pub overall: f32,
}

/// Bounded comparison history for one practice session.
///
/// Owned by the session context and reset when the session restarts. The
/// history is capped; the oldest results are evicted past the cap.
#[derive(Debug)]
pub struct ScoreSession {
    config: ScorerConfig,
    history: VecDeque<ComparisonResult>,
}

impl ScoreSession {
    pub fn new(config: ScorerConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_cap.min(1024)),
            config,
        }
    }

    /// Compares one sample, records the result, and returns it.
    pub fn score(
        &mut self,
        user_freq: f32,
        user_voiced: bool,
        target_freq: f32,
        time: f32,
    ) -> ComparisonResult {
        let result = compare_pitch(user_freq, user_voiced, target_freq, time, &self.config);
        self.record(result);
        result
    }

    /// Appends an externally computed result to the history.
    pub fn record(&mut self, result: ComparisonResult) {
        if self.history.len() == self.config.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(result);
    }

    pub fn history(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Clears the history for a fresh session.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Recomputes the session aggregate from the current history.
    pub fn summary(&self) -> SessionScore {
        let mut tier_counts = TierCounts::default();
        for result in &self.history {
            tier_counts.add(result.tier);
        }

        let scored: Vec<&ComparisonResult> = self
            .history
            .iter()
            .filter(|r| r.tier != ScoreTier::NoVoice)
            .collect();
        let average_score = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|r| r.score).sum::<f32>() / scored.len() as f32
        };

        let hits = tier_counts.perfect + tier_counts.good + tier_counts.ok + tier_counts.silence;
        let accuracy_percent = if scored.is_empty() {
            0.0
        } else {
            hits as f32 / scored.len() as f32 * 100.0
        };

        let voiced_errors: Vec<f32> = self
            .history
            .iter()
            .filter(|r| {
                matches!(
                    r.tier,
                    ScoreTier::Perfect | ScoreTier::Good | ScoreTier::Ok | ScoreTier::Poor
                )
            })
            .map(|r| r.cents_diff.abs())
            .collect();
        let pitch_stability = if voiced_errors.is_empty() {
            0.0
        } else {
            let mean = voiced_errors.iter().sum::<f32>() / voiced_errors.len() as f32;
            let variance = voiced_errors
                .iter()
                .map(|e| (e - mean) * (e - mean))
                .sum::<f32>()
                / voiced_errors.len() as f32;
            (100.0 - variance.sqrt()).clamp(0.0, 100.0)
        };

        SessionScore {
            average_score,
            accuracy_percent,
            tier_counts,
            pitch_stability,
            overall: self.config.accuracy_weight * average_score
                + self.config.stability_weight * pitch_stability,
        }
    }
}
