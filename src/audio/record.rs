//! Recording task: microphone → ADPCM encode → record buffer

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use super::device::AudioSource;
use crate::codec::{AdpcmState, encode_block};
use crate::{Error, Result};

/// Samples read per block
pub const BLOCK_SAMPLES: usize = 512;

/// Sleep when the source had nothing
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Encoder plus bounded output buffer for one recording
#[derive(Debug)]
pub struct RecordBuffer {
    encoder: AdpcmState,
    data: Vec<u8>,
    max_bytes: usize,
    full: bool,
}

impl RecordBuffer {
    /// Fresh encoder state and an empty buffer of `max_bytes`
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            encoder: AdpcmState::new(),
            data: Vec::with_capacity(max_bytes),
            max_bytes,
            full: false,
        }
    }

    /// Encode one block; returns `false` (and keeps nothing) if it would overflow
    pub fn push_block(&mut self, samples: &[i16]) -> bool {
        if self.full {
            return false;
        }
        let encoded_len = samples.len().div_ceil(2);
        if self.data.len() + encoded_len > self.max_bytes {
            self.full = true;
            return false;
        }
        encode_block(samples, &mut self.encoder, &mut self.data);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.full
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Starts recordings on a dedicated thread
#[derive(Debug, Clone, Copy)]
pub struct Recorder {
    max_bytes: usize,
}

impl Recorder {
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Start recording from `source`
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn start<S>(&self, mut source: S) -> Result<Recording<S>>
    where
        S: AudioSource + 'static,
    {
        let recording = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&recording);
        let max_bytes = self.max_bytes;

        let thread = std::thread::Builder::new()
            .name("record".to_string())
            .spawn(move || {
                source.discard_pending();
                let mut buffer = RecordBuffer::new(max_bytes);
                let mut block = [0i16; BLOCK_SAMPLES];

                while flag.load(Ordering::Acquire) {
                    let n = match source.read_samples(&mut block) {
                        Ok(n) => n,
                        Err(e) => {
                            tracing::warn!(error = %e, "microphone read failed, stopping");
                            break;
                        }
                    };
                    if n == 0 {
                        std::thread::sleep(IDLE_POLL);
                        continue;
                    }
                    if !buffer.push_block(&block[..n]) {
                        tracing::warn!(bytes = buffer.len(), max_bytes, "record buffer full, stopping");
                        break;
                    }
                }

                flag.store(false, Ordering::Release);
                tracing::debug!(bytes = buffer.len(), "recording finished");
                (buffer.into_bytes(), source)
            })
            .map_err(|e| Error::Audio(format!("failed to spawn record thread: {e}")))?;

        tracing::debug!("recording started");
        Ok(Recording { recording, thread })
    }
}

/// A recording in progress
pub struct Recording<S> {
    recording: Arc<AtomicBool>,
    thread: JoinHandle<(Vec<u8>, S)>,
}

impl<S> Recording<S> {
    /// False once stopped or once the buffer filled up
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Stop and hand back the ADPCM bytes and the source
    ///
    /// # Errors
    ///
    /// Returns error if the record thread panicked
    pub fn stop(self) -> Result<(Vec<u8>, S)> {
        self.recording.store(false, Ordering::Release);
        self.thread
            .join()
            .map_err(|_| Error::Audio("record thread panicked".to_string()))
    }
}
