//! # Note Segmentation Module
//!
//! Folds a time-ordered stream of frame-level pitch estimates into a
//! timeline of contiguous note and rest segments. The fold is greedy,
//! single-pass, and total: it never fails, it only produces an empty
//! timeline when nothing qualified.
//!
//! Timelines are the persisted reference format a practice session scores
//! against; segments and timelines serialize without information loss.

use crate::config::SegmenterConfig;
use crate::note::NoteLabel;
use crate::pitch::PitchEstimate;
use serde::{Deserialize, Serialize};

/// What produced the audio a segment was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Vocal,
    Instrumental,
    Silence,
}

/// One contiguous note or rest in a timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSegment {
    /// Segment start in seconds from stream start.
    pub start_time: f32,
    /// Segment end in seconds; always greater than `start_time`.
    pub end_time: f32,
    /// The sung note, or `None` for a rest.
    pub note: Option<NoteLabel>,
    /// Mean detected frequency over the segment, 0.0 for a rest.
    pub frequency_hz: f32,
    pub kind: SegmentKind,
    /// Lyric text aligned to this segment, supplied by the song library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric: Option<String>,
}

impl NoteSegment {
    pub fn duration(&self) -> f32 {
        self.end_time - self.start_time
    }

    pub fn is_rest(&self) -> bool {
        self.note.is_none()
    }

    /// Attaches lyric text; used by the song library when aligning words.
    pub fn with_lyric(mut self, lyric: impl Into<String>) -> Self {
        self.lyric = Some(lyric.into());
        self
    }
}

/// An ordered sequence of non-overlapping note segments.
///
/// Invariants: segments are sorted by start time, never overlap, and each
/// is at least the segmenter's minimum duration. A timeline is immutable
/// once built; re-analysis produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    segments: Vec<NoteSegment>,
}

impl Timeline {
    /// Builds a timeline from externally supplied segments (a song-library
    /// reference, for example). Segments are sorted by start time.
    ///
    /// # Panics
    /// * If any two segments overlap after sorting, or any segment has a
    ///   non-positive duration - reference data that shapeless is a caller
    ///   error, not something to repair here.
    pub fn new(mut segments: Vec<NoteSegment>) -> Self {
        segments.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for pair in segments.windows(2) {
            assert!(
                pair[0].end_time <= pair[1].start_time,
                "segments overlap at {}s",
                pair[1].start_time
            );
        }
        for segment in &segments {
            assert!(
                segment.end_time > segment.start_time,
                "segment at {}s has non-positive duration",
                segment.start_time
            );
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[NoteSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// End time of the last segment, or 0.0 for an empty timeline.
    pub fn total_duration(&self) -> f32 {
        self.segments.last().map_or(0.0, |s| s.end_time)
    }

    /// The segment covering time `t`, if any.
    pub fn segment_at(&self, t: f32) -> Option<&NoteSegment> {
        // Last segment starting at or before t.
        let index = self
            .segments
            .partition_point(|s| s.start_time <= t)
            .checked_sub(1)?;
        let candidate = &self.segments[index];
        (t < candidate.end_time).then_some(candidate)
    }

    /// Target frequency at time `t` for the comparator: the covering
    /// segment's frequency, or 0.0 over rests and uncovered time
    /// ("expected silence").
    pub fn target_frequency_at(&self, t: f32) -> f32 {
        match self.segment_at(t) {
            Some(segment) if !segment.is_rest() => segment.frequency_hz,
            _ => 0.0,
        }
    }
}

/// In-progress segment being accumulated by the fold.
#[derive(Debug)]
struct OpenSegment {
    start_time: f32,
    note: Option<NoteLabel>,
    freq_sum: f32,
    freq_count: usize,
}

impl OpenSegment {
    fn mean_frequency(&self) -> f32 {
        if self.freq_count == 0 {
            0.0
        } else {
            self.freq_sum / self.freq_count as f32
        }
    }
}

/// Greedy single-pass fold from frame estimates to a [`Timeline`].
///
/// Feed time-ordered samples with [`push`](Segmenter::push), then call
/// [`finish`](Segmenter::finish) with the stream end time. Candidate
/// segments shorter than the configured minimum are merged into the
/// previous segment when the note matches, and dropped otherwise.
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    /// Kind assigned to voiced segments (the stem being analyzed).
    kind: SegmentKind,
    segments: Vec<NoteSegment>,
    current: Option<OpenSegment>,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, kind: SegmentKind) -> Self {
        Self {
            config,
            kind,
            segments: Vec::new(),
            current: None,
        }
    }

    /// Folds one frame sample into the segmentation state.
    ///
    /// Samples must arrive in non-decreasing time order. An unvoiced
    /// estimate or an out-of-range label continues (or opens) a rest.
    pub fn push(&mut self, time: f32, estimate: &PitchEstimate, note: Option<NoteLabel>) {
        let incoming = if estimate.voiced { note } else { None };

        match &mut self.current {
            Some(open) if same_note(&open.note, &incoming) => {
                if estimate.voiced {
                    open.freq_sum += estimate.frequency_hz;
                    open.freq_count += 1;
                }
            }
            Some(_) => {
                self.close_current(time);
                self.open(time, incoming, estimate);
            }
            None => self.open(time, incoming, estimate),
        }
    }

    /// Closes the final open segment at `end_time` and returns the
    /// finished timeline.
    pub fn finish(mut self, end_time: f32) -> Timeline {
        self.close_current(end_time);
        Timeline {
            segments: self.segments,
        }
    }

    fn open(&mut self, time: f32, note: Option<NoteLabel>, estimate: &PitchEstimate) {
        let (freq_sum, freq_count) = if estimate.voiced {
            (estimate.frequency_hz, 1)
        } else {
            (0.0, 0)
        };
        self.current = Some(OpenSegment {
            start_time: time,
            note,
            freq_sum,
            freq_count,
        });
    }

    fn close_current(&mut self, end_time: f32) {
        let Some(open) = self.current.take() else {
            return;
        };
        if end_time <= open.start_time {
            return;
        }

        let duration = end_time - open.start_time;
        if duration < self.config.min_segment_duration {
            // Too short to stand alone: extend the previous segment when
            // the note matches, otherwise drop silently.
            if let Some(last) = self.segments.last_mut() {
                if same_note(&last.note, &open.note) {
                    last.end_time = end_time;
                }
            }
            return;
        }

        let is_rest = open.note.is_none();
        if is_rest && !self.config.keep_rest_segments {
            return;
        }

        self.segments.push(NoteSegment {
            start_time: open.start_time,
            end_time,
            frequency_hz: open.mean_frequency(),
            kind: if is_rest { SegmentKind::Silence } else { self.kind },
            note: open.note,
            lyric: None,
        });
    }
}

fn same_note(a: &Option<NoteLabel>, b: &Option<NoteLabel>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_note(b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{NoteName, note_from_hz};

    fn voiced(freq: f32) -> PitchEstimate {
        PitchEstimate {
            frequency_hz: freq,
            voiced: true,
            rms: 0.1,
            clarity: 0.9,
        }
    }

    fn push_tone(segmenter: &mut Segmenter, freq: f32, from: f32, until: f32, hop: f32) {
        let mut t = from;
        while t < until {
            let estimate = voiced(freq);
            segmenter.push(t, &estimate, note_from_hz(freq));
            t += hop;
        }
    }

    fn push_silence(segmenter: &mut Segmenter, from: f32, until: f32, hop: f32) {
        let mut t = from;
        while t < until {
            segmenter.push(t, &PitchEstimate::unvoiced(0.0), None);
            t += hop;
        }
    }

    #[test]
    fn all_silent_stream_yields_single_rest() {
        let mut segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        push_silence(&mut segmenter, 0.0, 2.0, 0.023);
        let timeline = segmenter.finish(2.0);

        assert_eq!(timeline.len(), 1);
        let rest = &timeline.segments()[0];
        assert!(rest.is_rest());
        assert_eq!(rest.kind, SegmentKind::Silence);
        assert_eq!(rest.frequency_hz, 0.0);
    }

    #[test]
    fn all_silent_stream_can_be_dropped_by_policy() {
        let config = SegmenterConfig {
            keep_rest_segments: false,
            ..SegmenterConfig::default()
        };
        let mut segmenter = Segmenter::new(config, SegmentKind::Vocal);
        push_silence(&mut segmenter, 0.0, 2.0, 0.023);
        assert!(segmenter.finish(2.0).is_empty());
    }

    #[test]
    fn empty_stream_yields_empty_timeline() {
        let segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        assert!(segmenter.finish(0.0).is_empty());
    }

    #[test]
    fn adjacent_same_note_estimates_collapse() {
        let mut segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        // Two A4 samples one hop apart, then enough A4 to qualify.
        push_tone(&mut segmenter, 440.0, 0.0, 0.5, 0.023);
        let timeline = segmenter.finish(0.5);

        assert_eq!(timeline.len(), 1);
        let segment = &timeline.segments()[0];
        assert_eq!(segment.note.unwrap().name, NoteName::A);
        assert_eq!(segment.note.unwrap().octave, 4);
        assert!((segment.frequency_hz - 440.0).abs() < 0.01);
    }

    #[test]
    fn sub_minimum_note_is_dropped() {
        let mut segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        push_silence(&mut segmenter, 0.0, 1.0, 0.023);
        // 0.05 s of A4: below the 0.1 s minimum.
        push_tone(&mut segmenter, 440.0, 1.0, 1.05, 0.023);
        push_silence(&mut segmenter, 1.05, 2.0, 0.023);
        let timeline = segmenter.finish(2.0);

        assert!(
            timeline.segments().iter().all(NoteSegment::is_rest),
            "short note leaked into the timeline"
        );
    }

    #[test]
    fn sub_minimum_rest_between_notes_is_dropped() {
        let mut segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        push_tone(&mut segmenter, 440.0, 0.0, 0.5, 0.023);
        // A blink of dropout, then the same note continues.
        push_silence(&mut segmenter, 0.5, 0.54, 0.023);
        push_tone(&mut segmenter, 440.0, 0.54, 1.0, 0.023);
        let timeline = segmenter.finish(1.0);

        // The dropout is gone; only note segments remain.
        assert!(timeline.segments().iter().all(|s| !s.is_rest()));
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn sub_minimum_continuation_merges_into_matching_neighbor() {
        let mut segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        push_tone(&mut segmenter, 440.0, 0.0, 0.5, 0.023);
        push_silence(&mut segmenter, 0.5, 0.54, 0.023); // dropped
        push_tone(&mut segmenter, 440.0, 0.54, 0.62, 0.023); // too short alone
        push_silence(&mut segmenter, 0.62, 1.0, 0.023);
        let timeline = segmenter.finish(1.0);

        // The short continuation extended the first A4 segment instead of
        // appearing on its own.
        let notes: Vec<_> = timeline.segments().iter().filter(|s| !s.is_rest()).collect();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].start_time.abs() < 1e-6);
        assert!((notes[0].end_time - 0.62).abs() < 1e-3);
    }

    #[test]
    fn note_change_splits_segments() {
        let mut segmenter = Segmenter::new(SegmenterConfig::default(), SegmentKind::Vocal);
        push_tone(&mut segmenter, 440.0, 0.0, 0.5, 0.023);
        push_tone(&mut segmenter, 493.88, 0.5, 1.0, 0.023);
        let timeline = segmenter.finish(1.0);

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.segments()[0].note.unwrap().name, NoteName::A);
        assert_eq!(timeline.segments()[1].note.unwrap().name, NoteName::B);
        // Non-overlap invariant.
        assert!(timeline.segments()[0].end_time <= timeline.segments()[1].start_time);
    }

    #[test]
    fn target_lookup_over_rests_and_gaps_is_silence() {
        let segments = vec![
            NoteSegment {
                start_time: 1.0,
                end_time: 2.0,
                note: note_from_hz(440.0),
                frequency_hz: 440.0,
                kind: SegmentKind::Vocal,
                lyric: None,
            },
            NoteSegment {
                start_time: 2.0,
                end_time: 3.0,
                note: None,
                frequency_hz: 0.0,
                kind: SegmentKind::Silence,
                lyric: None,
            },
        ];
        let timeline = Timeline::new(segments);

        assert_eq!(timeline.target_frequency_at(0.5), 0.0); // before coverage
        assert_eq!(timeline.target_frequency_at(1.5), 440.0);
        assert_eq!(timeline.target_frequency_at(2.5), 0.0); // rest
        assert_eq!(timeline.target_frequency_at(9.0), 0.0); // past the end
        assert_eq!(timeline.total_duration(), 3.0);
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn overlapping_reference_segments_panic() {
        let segment = NoteSegment {
            start_time: 0.0,
            end_time: 1.0,
            note: note_from_hz(440.0),
            frequency_hz: 440.0,
            kind: SegmentKind::Vocal,
            lyric: None,
        };
        let mut other = segment.clone();
        other.start_time = 0.5;
        other.end_time = 1.5;
        Timeline::new(vec![segment, other]);
    }
}
