// vocal-core/src/lib.rs

//! The core logic for the vocal practice application.
//! This crate is responsible for signal conditioning, pitch detection,
//! note mapping, temporal stabilization, note segmentation, and pitch
//! scoring. It is completely headless and contains no GUI code.
//!
//! The same DSP core serves both operating modes:
//! - **Streaming**: [`session::LiveSession`] drives the pipeline from a
//!   capture callback and emits one [`LiveUpdate`] per hop.
//! - **Batch**: [`analyze::analyze_waveform`] slices a decoded waveform
//!   into overlapping frames, estimates them in parallel, and folds the
//!   results into a [`segment::Timeline`].

pub mod analyze;
pub mod audio;
pub mod config;
pub mod note;
pub mod pitch;
pub mod preprocess;
pub mod score;
pub mod segment;
pub mod session;
pub mod stabilize;

pub use analyze::{AnalyzerConfig, SongAnalysis};
pub use note::{NoteLabel, NoteName};
pub use pitch::PitchEstimate;
pub use score::{ComparisonResult, ScoreTier, SessionScore};
pub use segment::{NoteSegment, SegmentKind, Timeline};
pub use session::{LiveSession, LiveSessionConfig};

/// One live pitch reading, delivered at the stabilizer's update cadence.
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    /// Stream time of the analyzed frame's center, in seconds.
    pub time: f32,
    /// Smoothed frequency in Hz, 0.0 when unvoiced.
    pub frequency_hz: f32,
    pub voiced: bool,
    /// Nearest note of the smoothed pitch, `None` for a rest.
    pub note: Option<NoteLabel>,
    /// Cents offset of the smoothed pitch from its note center.
    pub cents_offset: Option<i32>,
    /// Note stability over the recent window, 0-100.
    pub stability: f32,
    /// Score against the reference timeline, when one is loaded.
    pub comparison: Option<ComparisonResult>,
}
