//! Real-time audio pipeline
//!
//! Playback and recording each run on their own named thread, talking to the
//! rest of the device through the play ring and the returned record buffer.

pub mod device;
mod playback;
mod record;
mod tone;

pub use device::{
    Amplifier, AudioSink, AudioSource, InputStream, LogAmplifier, OutputStream, SinkHandle,
    SourceHandle,
};
pub use playback::{PlaybackLoop, PlaybackTask};
pub use record::{BLOCK_SAMPLES, RecordBuffer, Recorder, Recording};
pub use tone::{TONE_AMPLITUDE, play_tone, tone_frames};
