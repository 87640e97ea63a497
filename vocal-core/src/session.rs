//! # Live Session Module
//!
//! Runs the full live pipeline (conditioning, pitch detection, note
//! mapping, stabilization, optional scoring against a reference timeline)
//! on a dedicated worker thread fed by the capture callback.
//!
//! ## Architecture
//! - **Worker thread**: owns the CPAL stream, the detector scratch buffers,
//!   and the per-session stabilizer/scorer state; nothing is shared
//! - **Communication**: crossbeam channels for frames in, updates out, and
//!   shutdown
//! - **Lifecycle**: capture failures surface from [`LiveSession::start`]
//!   with no session state left behind; [`LiveSession::stop`] is
//!   synchronous - when it returns, no further updates are produced and
//!   the capture stream is released

use anyhow::{Result, anyhow};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Sender, bounded};
use std::thread::{self, JoinHandle};

use crate::LiveUpdate;
use crate::config::{EstimatorConfig, PipelineConfig, ScorerConfig, StabilizerConfig};
use crate::pitch::PitchDetector;
use crate::preprocess::Preprocessor;
use crate::score::{ScoreSession, SessionScore};
use crate::segment::Timeline;
use crate::audio;
use crate::stabilize::PitchStabilizer;

/// Everything a live session needs: per-stage tuning plus an optional
/// reference timeline to score against.
#[derive(Debug, Clone, Default)]
pub struct LiveSessionConfig {
    pub pipeline: PipelineConfig,
    pub estimator: EstimatorConfig,
    pub stabilizer: StabilizerConfig,
    pub scorer: ScorerConfig,
    /// Reference the user is singing along to; `None` disables scoring.
    pub reference: Option<Timeline>,
}

/// A running live analysis session.
///
/// Created by [`LiveSession::start`]; ended by [`LiveSession::stop`], which
/// returns the final session score. Dropping the session without stopping
/// signals the worker to shut down but does not wait for it.
pub struct LiveSession {
    shutdown_tx: Sender<()>,
    worker: Option<JoinHandle<ScoreSession>>,
}

impl LiveSession {
    /// Starts capture and analysis, delivering one [`LiveUpdate`] per hop
    /// on `update_tx`.
    ///
    /// The CPAL stream is opened on the worker thread (stream handles must
    /// stay on the thread that created them on some platforms); the worker
    /// reports the outcome back before this function returns, so a capture
    /// failure surfaces here and leaves nothing running.
    pub fn start(config: LiveSessionConfig, update_tx: Sender<LiveUpdate>) -> Result<LiveSession> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (startup_tx, startup_rx) = bounded::<Result<u32>>(1);

        let worker = thread::spawn(move || {
            // Frames are dropped by the capture callback when this channel
            // is full; a small bound keeps the worker close to real time.
            let (frame_tx, frame_rx) = bounded::<Vec<f32>>(8);

            let (stream, sample_rate) = match audio::start_capture(frame_tx, &config.pipeline) {
                Ok(pair) => {
                    let _ = startup_tx.send(Ok(pair.1));
                    pair
                }
                Err(e) => {
                    let _ = startup_tx.send(Err(e));
                    return ScoreSession::new(config.scorer);
                }
            };

            let pre = Preprocessor::new(sample_rate, &config.pipeline);
            let mut detector = PitchDetector::new(
                sample_rate,
                config.pipeline.frame_size,
                &config.estimator,
            );
            let mut stabilizer = PitchStabilizer::new(config.stabilizer);
            let mut scores = ScoreSession::new(config.scorer);
            let mut conditioned = vec![0.0f32; config.pipeline.frame_size];

            // Frame n covers samples [n*hop, n*hop + frame); its estimate
            // is stamped at the frame center, matching batch analysis.
            let center_offset = config.pipeline.frame_size as f32 / 2.0;
            let hop = config.pipeline.hop_size as f32;
            let mut frame_index: u64 = 0;

            loop {
                crossbeam_channel::select! {
                    recv(frame_rx) -> msg => match msg {
                        Ok(frame) => {
                            let time = (frame_index as f32 * hop + center_offset)
                                / sample_rate as f32;
                            frame_index += 1;

                            pre.process_into(&frame, &mut conditioned);
                            let estimate = detector.detect(&conditioned);
                            let stabilized = stabilizer.process(&estimate);

                            let comparison = config.reference.as_ref().map(|timeline| {
                                let target = timeline.target_frequency_at(time);
                                scores.score(
                                    stabilized.frequency_hz,
                                    stabilized.voiced,
                                    target,
                                    time,
                                )
                            });

                            let update = LiveUpdate {
                                time,
                                frequency_hz: stabilized.frequency_hz,
                                voiced: stabilized.voiced,
                                note: stabilized.note,
                                cents_offset: stabilized.note.map(|n| n.cents_offset),
                                stability: stabilized.stability,
                                comparison,
                            };
                            if update_tx.send(update).is_err() {
                                eprintln!("[SESSION] Update receiver dropped, stopping");
                                break;
                            }
                        }
                        Err(_) => {
                            eprintln!("[SESSION] Capture channel closed");
                            break;
                        }
                    },
                    recv(shutdown_rx) -> _ => {
                        break;
                    }
                }
            }

            // Release the capture source before the thread exits; nothing
            // runs in the background after this.
            if let Err(e) = stream.pause() {
                eprintln!("[SESSION] Error pausing stream: {}", e);
            }
            drop(stream);
            scores
        });

        match startup_rx.recv() {
            Ok(Ok(_sample_rate)) => Ok(LiveSession {
                shutdown_tx,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                // Worker already exited; surface its failure.
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(anyhow!("audio worker died during startup"))
            }
        }
    }

    /// Stops the session and returns the final score.
    ///
    /// Synchronous: the worker is joined, so no callback-driven mutation of
    /// session state happens after this returns and the capture stream is
    /// already released.
    pub fn stop(mut self) -> SessionScore {
        let _ = self.shutdown_tx.send(());
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(scores)) => scores.summary(),
            _ => {
                eprintln!("[SESSION] Worker lost before reporting scores");
                SessionScore::default()
            }
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.shutdown_tx.send(());
        }
    }
}

/// Replays a recorded stream through the live pipeline stages without any
/// capture device, producing the same updates a live run would.
///
/// The stabilizer is sequential state, so live analysis cannot be
/// parallelized - but it can be replayed deterministically over recorded
/// audio, which is what this function (and the tests built on it) does.
pub fn replay_stream(
    samples: &[f32],
    sample_rate: u32,
    config: &LiveSessionConfig,
) -> (Vec<LiveUpdate>, SessionScore) {
    assert!(sample_rate > 0, "sample rate must be positive");

    let frame_size = config.pipeline.frame_size;
    let hop = config.pipeline.hop_size;
    let pre = Preprocessor::new(sample_rate, &config.pipeline);
    let mut detector = PitchDetector::new(sample_rate, frame_size, &config.estimator);
    let mut stabilizer = PitchStabilizer::new(config.stabilizer.clone());
    let mut scores = ScoreSession::new(config.scorer.clone());
    let mut conditioned = vec![0.0f32; frame_size];
    let mut updates = Vec::new();

    let mut offset = 0;
    while offset + frame_size <= samples.len() {
        let time = (offset as f32 + frame_size as f32 / 2.0) / sample_rate as f32;
        pre.process_into(&samples[offset..offset + frame_size], &mut conditioned);
        let estimate = detector.detect(&conditioned);
        let stabilized = stabilizer.process(&estimate);

        let comparison = config.reference.as_ref().map(|timeline| {
            let target = timeline.target_frequency_at(time);
            scores.score(stabilized.frequency_hz, stabilized.voiced, target, time)
        });

        updates.push(LiveUpdate {
            time,
            frequency_hz: stabilized.frequency_hz,
            voiced: stabilized.voiced,
            note: stabilized.note,
            cents_offset: stabilized.note.map(|n| n.cents_offset),
            stability: stabilized.stability,
            comparison,
        });
        offset += hop;
    }

    let summary = scores.summary();
    (updates, summary)
}
