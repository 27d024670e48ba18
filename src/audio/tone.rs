//! Confirmation tones

use std::f32::consts::PI;
use std::time::Duration;

use super::device::{Amplifier, AudioSink};
use crate::Result;

/// Peak amplitude of feedback tones
pub const TONE_AMPLITUDE: i16 = 10_000;

/// Stereo sine frames for `duration` at `sample_rate`
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn tone_frames(frequency: f32, duration: Duration, sample_rate: u32) -> Vec<[i16; 2]> {
    let count = (duration.as_secs_f32() * sample_rate as f32) as usize;
    let amplitude = f32::from(TONE_AMPLITUDE);

    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let sample = ((2.0 * PI * frequency * t).sin() * amplitude) as i16;
            [sample, sample]
        })
        .collect()
}

/// Play a tone with the amplifier enabled for its duration
///
/// # Errors
///
/// Returns error if the sink rejects the frames
pub fn play_tone(
    sink: &mut impl AudioSink,
    amp: &mut impl Amplifier,
    frequency: f32,
    duration: Duration,
    sample_rate: u32,
) -> Result<()> {
    let frames = tone_frames(frequency, duration, sample_rate);
    amp.set_enabled(true);
    let result = sink.write_frames(&frames);
    amp.set_enabled(false);
    result
}
