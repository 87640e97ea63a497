//! # Audio Capture Module
//!
//! Real-time microphone capture using CPAL (Cross-Platform Audio Library),
//! feeding fixed-size overlapping frames to the analysis pipeline.
//!
//! ## Features
//! - Automatic input device selection with mono f32 preference
//! - Overlapping frame assembly: frames of `frame_size` samples advance by
//!   `hop_size`, so the analyzer sees the same 75% overlap as batch mode
//! - Non-blocking hand-off: a full analysis channel drops the frame rather
//!   than stalling the audio callback

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;

use crate::config::PipelineConfig;

/// Preferred capture sample rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Starts audio capture from the default input device.
///
/// The capture callback accumulates incoming samples and emits one frame
/// per hop over `sender`. It never blocks and never grows its buffer past
/// one frame plus one device callback.
///
/// # Arguments
/// * `sender` - Channel delivering frames to the analysis thread
/// * `config` - Frame and hop sizes for the pipeline instance
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Live stream handle and the actual rate
/// * `Err(e)` - No device, no usable config, or the stream failed to start
pub fn start_capture(
    sender: Sender<Vec<f32>>,
    config: &PipelineConfig,
) -> Result<(cpal::Stream, u32)> {
    assert!(
        config.hop_size > 0 && config.hop_size <= config.frame_size,
        "hop size must be positive and no larger than the frame size"
    );

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    eprintln!("[CAPTURE] Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let stream_config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(TARGET_SAMPLE_RATE))
        .into();
    let sample_rate = stream_config.sample_rate.0;

    eprintln!("[CAPTURE] Selected sample rate: {} Hz", sample_rate);

    let err_fn = |err| eprintln!("[CAPTURE] Stream error: {}", err);

    let frame_size = config.frame_size;
    let hop_size = config.hop_size;

    // Accumulates callback deliveries until a full frame is available.
    let mut accumulator: Vec<f32> = Vec::with_capacity(frame_size * 2);

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            accumulator.extend_from_slice(data);

            // Emit every complete frame, advancing by one hop so
            // consecutive frames overlap.
            while accumulator.len() >= frame_size {
                let frame = accumulator[..frame_size].to_vec();

                // Drop the frame if the analyzer is behind; stalling the
                // audio callback is never an option.
                let _ = sender.try_send(frame);

                accumulator.drain(..hop_size);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Finds the best supported input configuration for the target rate:
/// mono, 32-bit float, sample-rate range closest to the target.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i32 - target_rate as i32).abs();
            let max_diff = (c.max_sample_rate().0 as i32 - target_rate as i32).abs();
            min_diff.min(max_diff)
        })
}
