//! Audio hardware seams and their `cpal` implementations
//!
//! `cpal` streams are not `Send` on every platform, so each opened device is
//! split in two: the stream object stays with the thread that opened it, and a
//! `Send` handle carrying the sample queue is moved into the worker thread.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Output queue depth in frames before `write_frames` blocks
const OUTPUT_HIGH_WATER: usize = 4096;

/// Input queue cap in samples; older samples are dropped beyond it
const INPUT_QUEUE_CAP: usize = 64 * 1024;

/// Sleep while waiting on a device queue
const QUEUE_POLL: Duration = Duration::from_millis(2);

/// Longest `read_samples` waits to fill its buffer
const READ_WAIT: Duration = Duration::from_millis(100);

/// Longest `write_frames` waits for the queue to drain
const WRITE_WAIT: Duration = Duration::from_secs(1);

/// Stereo sample output (speaker)
pub trait AudioSink: Send {
    /// Queue frames for output, blocking while the device is behind
    ///
    /// # Errors
    ///
    /// Returns error if the device stopped accepting samples
    fn write_frames(&mut self, frames: &[[i16; 2]]) -> Result<()>;
}

/// Mono sample input (microphone)
pub trait AudioSource: Send {
    /// Read up to `buf.len()` samples, returning the count read
    ///
    /// # Errors
    ///
    /// Returns error if the device failed
    fn read_samples(&mut self, buf: &mut [i16]) -> Result<usize>;

    /// Drop anything captured before now
    fn discard_pending(&mut self) {}
}

/// Speaker amplifier enable line
pub trait Amplifier: Send {
    fn set_enabled(&mut self, on: bool);
}

/// [`Amplifier`] for hosts without an enable line
#[derive(Debug, Default)]
pub struct LogAmplifier {
    enabled: bool,
}

impl LogAmplifier {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Amplifier for LogAmplifier {
    fn set_enabled(&mut self, on: bool) {
        if self.enabled != on {
            tracing::debug!(on, "amplifier");
        }
        self.enabled = on;
    }
}

/// Open output stream; keep alive on the opening thread
pub struct OutputStream {
    _stream: Stream,
}

/// `Send` handle feeding an [`OutputStream`]
#[derive(Clone)]
pub struct SinkHandle {
    queue: Arc<Mutex<VecDeque<[i16; 2]>>>,
}

impl OutputStream {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no device or no matching configuration is available
    pub fn open(sample_rate: u32) -> Result<(Self, SinkHandle)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = SampleRate(sample_rate);
        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        };
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 2))
            .or_else(|| {
                // Fallback: mono
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 1))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_HIGH_WATER * 2)));
        let source = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = source.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let [left, right] = queue.pop_front().unwrap_or([0, 0]);
                        let (left, right) = (to_f32(left), to_f32(right));
                        match frame {
                            [mono] => *mono = f32::midpoint(left, right),
                            [l, r, rest @ ..] => {
                                *l = left;
                                *r = right;
                                rest.fill(0.0);
                            }
                            [] => {}
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio output opened"
        );

        Ok((Self { _stream: stream }, SinkHandle { queue }))
    }
}

impl AudioSink for SinkHandle {
    fn write_frames(&mut self, frames: &[[i16; 2]]) -> Result<()> {
        let deadline = Instant::now() + WRITE_WAIT;
        loop {
            let queued = self
                .queue
                .lock()
                .map_err(|_| Error::Audio("output queue poisoned".to_string()))?
                .len();
            if queued < OUTPUT_HIGH_WATER {
                break;
            }
            if Instant::now() >= deadline {
                return Err(Error::Audio("output device stalled".to_string()));
            }
            std::thread::sleep(QUEUE_POLL);
        }

        self.queue
            .lock()
            .map_err(|_| Error::Audio("output queue poisoned".to_string()))?
            .extend(frames.iter().copied());
        Ok(())
    }
}

/// Open input stream; keep alive on the opening thread
pub struct InputStream {
    _stream: Stream,
}

/// `Send` handle draining an [`InputStream`]
#[derive(Clone)]
pub struct SourceHandle {
    queue: Arc<Mutex<VecDeque<i16>>>,
}

impl InputStream {
    /// Open the default input device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no device or no matching configuration is available
    pub fn open(sample_rate: u32) -> Result<(Self, SourceHandle)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let rate = SampleRate(sample_rate);
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config: StreamConfig = supported.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(INPUT_QUEUE_CAP)));
        let sink = Arc::clone(&queue);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut queue) = sink.lock() {
                        // First channel only
                        queue.extend(data.iter().step_by(channels).map(|&s| to_i16(s)));
                        let excess = queue.len().saturating_sub(INPUT_QUEUE_CAP);
                        queue.drain(..excess);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio input opened"
        );

        Ok((Self { _stream: stream }, SourceHandle { queue }))
    }
}

impl AudioSource for SourceHandle {
    fn read_samples(&mut self, buf: &mut [i16]) -> Result<usize> {
        let deadline = Instant::now() + READ_WAIT;
        loop {
            {
                let mut queue = self
                    .queue
                    .lock()
                    .map_err(|_| Error::Audio("input queue poisoned".to_string()))?;
                if queue.len() >= buf.len() || Instant::now() >= deadline {
                    let n = queue.len().min(buf.len());
                    for (out, sample) in buf.iter_mut().zip(queue.drain(..n)) {
                        *out = sample;
                    }
                    return Ok(n);
                }
            }
            std::thread::sleep(QUEUE_POLL);
        }
    }

    fn discard_pending(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

fn to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversions() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(1.0), 32767);
        assert_eq!(to_i16(-2.0), -32768);
        assert!((to_f32(-32768) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_log_amplifier_tracks_state() {
        let mut amp = LogAmplifier::default();
        assert!(!amp.is_enabled());
        amp.set_enabled(true);
        assert!(amp.is_enabled());
        amp.set_enabled(false);
        assert!(!amp.is_enabled());
    }

    #[test]
    fn test_source_handle_reads_queued_samples() {
        let mut source = SourceHandle {
            queue: Arc::new(Mutex::new(VecDeque::from(vec![1, 2, 3, 4, 5]))),
        };
        let mut buf = [0i16; 3];
        assert_eq!(source.read_samples(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);

        source.discard_pending();
        assert_eq!(source.read_samples(&mut buf).unwrap(), 0);
    }
}
