//! # Note Mapping Module
//!
//! Bidirectional conversion between frequency in Hz and equal-temperament
//! note labels, based on A4 = 440 Hz.
//!
//! ## Features
//! - Frequency to note label with cents offset in [-50, 50]
//! - Note label to frequency (exact inverse on the semitone grid)
//! - Cent deviation between two arbitrary frequencies
//! - Plausible-range gating so harmonics-of-noise never label a note
//!
//! Silence and out-of-range frequencies map to `None` ("rest"); the mapping
//! itself is pure and never fails.

use anyhow::anyhow;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Pitch-class names in semitone order starting at C, sharp spelling.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Lowest frequency considered a plausible musical pitch, in Hz.
pub const MIN_PLAUSIBLE_HZ: f32 = 80.0;

/// Highest frequency considered a plausible musical pitch, in Hz.
pub const MAX_PLAUSIBLE_HZ: f32 = 2000.0;

// Representable MIDI range; C0 (12) up to G9 (127).
const MIDI_MIN: i32 = 12;
const MIDI_MAX: i32 = 127;

/// Static map for quick note name to semitone index lookups.
static NAME_INDEX: Lazy<BTreeMap<&'static str, usize>> = Lazy::new(|| {
    NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(index, &name)| (name, index))
        .collect()
});

/// A pitch class in the twelve-tone chromatic scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl NoteName {
    /// Semitone index within the octave (C = 0 .. B = 11).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Pitch class for a semitone index; indices wrap modulo 12.
    pub fn from_index(index: usize) -> Self {
        use NoteName::*;
        const ORDER: [NoteName; 12] = [
            C, CSharp, D, DSharp, E, F, FSharp, G, GSharp, A, ASharp, B,
        ];
        ORDER[index % 12]
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", NOTE_NAMES[self.index()])
    }
}

impl FromStr for NoteName {
    type Err = anyhow::Error;

    /// Parses a sharp-spelled pitch-class name ("C", "C#", ... "B").
    /// Flat spellings are not accepted; passing one is a caller error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAME_INDEX
            .get(s)
            .map(|&index| NoteName::from_index(index))
            .ok_or_else(|| anyhow!("unknown note name: {s:?}"))
    }
}

/// A concrete musical note: pitch class, octave, and the deviation of the
/// source frequency from that note's center, in cents.
///
/// Octave numbering follows scientific pitch notation (A4 = 440 Hz).
/// A rest (silence, unvoiced audio) is represented as `Option::<NoteLabel>::None`
/// wherever labels flow through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLabel {
    pub name: NoteName,
    pub octave: i32,
    /// Deviation from the note center in [-50, 50] cents.
    pub cents_offset: i32,
}

impl NoteLabel {
    /// Whether two labels name the same note, ignoring the cents offset.
    /// Segmentation and stability tracking compare notes this way so that
    /// intonation jitter inside one note does not split it.
    pub fn same_note(&self, other: &NoteLabel) -> bool {
        self.name == other.name && self.octave == other.octave
    }

    /// The equal-temperament center frequency of this label, in Hz.
    pub fn center_hz(&self) -> f32 {
        hz_from_note(self.name, self.octave)
    }
}

impl fmt::Display for NoteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.octave)
    }
}

/// Maps a frequency to the nearest equal-temperament note.
///
/// Returns `None` (a rest) for non-positive or implausible frequencies and
/// for anything that rounds outside the representable MIDI range.
///
/// # Arguments
/// * `hz` - Input frequency in Hz
///
/// # Returns
/// * `Some(label)` - Nearest note with its cents offset
/// * `None` - No musical pitch (silence, rumble, or out of range)
pub fn note_from_hz(hz: f32) -> Option<NoteLabel> {
    if !hz.is_finite() || hz <= 0.0 || !(MIN_PLAUSIBLE_HZ..=MAX_PLAUSIBLE_HZ).contains(&hz) {
        return None;
    }

    // Fractional MIDI number; A4 = 440 Hz = MIDI 69.
    let midi = 69.0 + 12.0 * (hz / 440.0).log2();
    let rounded = midi.round();
    let cents_offset = ((midi - rounded) * 100.0).round() as i32;
    let rounded = rounded as i32;

    if !(MIDI_MIN..=MIDI_MAX).contains(&rounded) {
        return None;
    }

    Some(NoteLabel {
        name: NoteName::from_index((rounded % 12) as usize),
        octave: rounded / 12 - 1,
        cents_offset,
    })
}

/// The equal-temperament frequency of a note, in Hz.
///
/// Exact inverse of [`note_from_hz`] on the semitone grid: for any label in
/// the plausible range, converting the returned frequency back yields the
/// same name and octave with a cents offset of zero.
pub fn hz_from_note(name: NoteName, octave: i32) -> f32 {
    let midi = (octave + 1) * 12 + name.index() as i32;
    440.0 * 2.0_f32.powf((midi - 69) as f32 / 12.0)
}

/// Deviation of `freq` from `target_freq` in cents.
///
/// Cents are a logarithmic unit of pitch measurement where:
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
///
/// Both frequencies must be positive; the comparator guards for that before
/// calling.
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        let label = note_from_hz(440.0).unwrap();
        assert_eq!(label.name, NoteName::A);
        assert_eq!(label.octave, 4);
        assert_eq!(label.cents_offset, 0);
        assert_eq!(hz_from_note(NoteName::A, 4), 440.0);
    }

    #[test]
    fn round_trip_within_one_cent() {
        for octave in 0..=8 {
            for index in 0..12 {
                let name = NoteName::from_index(index);
                let hz = hz_from_note(name, octave);
                if !(MIN_PLAUSIBLE_HZ..=MAX_PLAUSIBLE_HZ).contains(&hz) {
                    continue;
                }
                let label = note_from_hz(hz).unwrap();
                assert_eq!(label.name, name, "{name}{octave} at {hz} Hz");
                assert_eq!(label.octave, octave, "{name}{octave} at {hz} Hz");
                assert!(
                    label.cents_offset.abs() <= 1,
                    "{name}{octave}: {} cents",
                    label.cents_offset
                );
            }
        }
    }

    #[test]
    fn out_of_range_is_rest() {
        assert_eq!(note_from_hz(0.0), None);
        assert_eq!(note_from_hz(-220.0), None);
        assert_eq!(note_from_hz(f32::NAN), None);
        assert_eq!(note_from_hz(79.0), None);
        assert_eq!(note_from_hz(2100.0), None);
    }

    #[test]
    fn cents_offset_sign() {
        // 10 cents sharp of A4
        let sharp = 440.0 * 2.0_f32.powf(10.0 / 1200.0);
        let label = note_from_hz(sharp).unwrap();
        assert_eq!(label.name, NoteName::A);
        assert_eq!(label.cents_offset, 10);

        // 10 cents flat
        let flat = 440.0 * 2.0_f32.powf(-10.0 / 1200.0);
        let label = note_from_hz(flat).unwrap();
        assert_eq!(label.cents_offset, -10);
    }

    #[test]
    fn halfway_rounds_to_a_neighbor() {
        // 50 cents above A4 sits exactly between A4 and A#4; either neighbor
        // is acceptable but the offset must stay within [-50, 50].
        let halfway = 440.0 * 2.0_f32.powf(50.0 / 1200.0);
        let label = note_from_hz(halfway).unwrap();
        assert!(label.cents_offset.abs() <= 50);
    }

    #[test]
    fn parse_note_names() {
        assert_eq!("C#".parse::<NoteName>().unwrap(), NoteName::CSharp);
        assert_eq!("B".parse::<NoteName>().unwrap(), NoteName::B);
        assert!("H".parse::<NoteName>().is_err());
        assert!("Db".parse::<NoteName>().is_err());
    }

    #[test]
    fn same_note_ignores_cents() {
        let a = note_from_hz(440.0).unwrap();
        let b = note_from_hz(442.0).unwrap();
        assert!(a.same_note(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn cents_between_octave() {
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-3);
        assert!((cents_between(440.0, 880.0) + 1200.0).abs() < 1e-3);
        assert!(cents_between(440.0, 440.0).abs() < 1e-6);
    }
}
