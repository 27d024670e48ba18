//! Playback task: play ring → ADPCM decode → speaker

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::device::{Amplifier, AudioSink};
use crate::codec::{AdpcmState, decode_byte};
use crate::ring::Consumer;
use crate::{Error, Result};

/// ADPCM bytes decoded per tick (two frames each)
const TICK_BYTES: usize = 512;

/// Sleep when the ring is empty
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Decode loop driven one tick at a time
pub struct PlaybackLoop<K, A> {
    play: Consumer,
    sink: K,
    amp: A,
    decoder: AdpcmState,
    silence_timeout: Duration,
    amp_on: bool,
    last_audio: Option<Instant>,
    bytes: Vec<u8>,
    frames: Vec<[i16; 2]>,
}

impl<K: AudioSink, A: Amplifier> PlaybackLoop<K, A> {
    pub fn new(play: Consumer, sink: K, amp: A, silence_timeout: Duration) -> Self {
        Self {
            play,
            sink,
            amp,
            decoder: AdpcmState::new(),
            silence_timeout,
            amp_on: false,
            last_audio: None,
            bytes: vec![0; TICK_BYTES],
            frames: Vec::with_capacity(TICK_BYTES * 2),
        }
    }

    /// Decode and play whatever is buffered, or handle silence
    ///
    /// Returns the ADPCM bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns error if the sink rejects the frames
    pub fn tick(&mut self, now: Instant) -> Result<usize> {
        let n = self.play.pop_slice(&mut self.bytes);
        if n == 0 {
            self.check_silence(now);
            return Ok(0);
        }

        if !self.amp_on {
            self.amp.set_enabled(true);
            self.amp_on = true;
            tracing::debug!("playback started");
        }

        self.frames.clear();
        for &byte in &self.bytes[..n] {
            for sample in decode_byte(byte, &mut self.decoder) {
                self.frames.push([sample, sample]);
            }
        }
        self.last_audio = Some(now);
        self.sink.write_frames(&self.frames)?;
        Ok(n)
    }

    fn check_silence(&mut self, now: Instant) {
        let Some(last) = self.last_audio else {
            return;
        };
        if now.saturating_duration_since(last) < self.silence_timeout {
            return;
        }

        self.amp.set_enabled(false);
        self.amp_on = false;
        self.decoder.reset();
        self.last_audio = None;
        tracing::debug!("playback idle, amplifier off");
    }

    #[must_use]
    pub const fn amplifier_on(&self) -> bool {
        self.amp_on
    }

    #[must_use]
    pub const fn decoder(&self) -> &AdpcmState {
        &self.decoder
    }

    #[must_use]
    pub const fn sink(&self) -> &K {
        &self.sink
    }

    #[must_use]
    pub const fn amplifier(&self) -> &A {
        &self.amp
    }
}

/// Running playback thread
pub struct PlaybackTask {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackTask {
    /// Run `playback` on a dedicated thread until [`stop`](Self::stop)
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn<K, A>(mut playback: PlaybackLoop<K, A>) -> Result<Self>
    where
        K: AudioSink + 'static,
        A: Amplifier + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    match playback.tick(Instant::now()) {
                        Ok(0) => std::thread::sleep(IDLE_POLL),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "playback write failed");
                            std::thread::sleep(IDLE_POLL);
                        }
                    }
                }
                playback.amp.set_enabled(false);
            })
            .map_err(|e| Error::Audio(format!("failed to spawn playback thread: {e}")))?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("playback thread panicked");
            }
        }
    }
}

impl Drop for PlaybackTask {
    fn drop(&mut self) {
        self.stop();
    }
}
