//! Record → upload → streamed reply exchange
//!
//! Wire protocol, client to server: a 4-byte big-endian length followed by
//! the ADPCM recording. Server to client: the hex directive up to `*`, then
//! raw ADPCM audio until the stream ends.

pub mod directive;
pub mod reply;

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

pub use directive::{Control, ControlDirective};
pub use reply::{ReplyChunk, ReplyDemux, ReplyPhase};

use crate::config::{ServerConfig, SessionConfig};
use crate::ring::Producer;
use crate::transport::Transport;
use crate::{Error, Result};

/// Bytes requested per receive
const RECEIVE_CHUNK: usize = 1024;

/// Sleep between retries while the play buffer is full
const BACKPRESSURE_POLL: Duration = Duration::from_millis(1);

/// Progress shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    ServerUnreachable,
    Sending,
    Thinking,
    Replying,
    StreamTimeout,
}

impl SessionStatus {
    /// Text for the status line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::ServerUnreachable => "Server unreachable",
            Self::Sending => "Sending...",
            Self::Thinking => "Thinking...",
            Self::Replying => "Replying...",
            Self::StreamTimeout => "Timeout!",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification for the UI collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(SessionStatus),
    /// Control directive received ahead of the audio
    Directive(ControlDirective),
    /// Exchange over, UI may return to idle
    Finished,
}

/// Outcome of one exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Recording bytes uploaded (excluding the length prefix)
    pub uploaded: usize,
    /// Directive, if one parsed
    pub directive: Option<ControlDirective>,
    /// Reply audio bytes queued for playback
    pub audio_bytes: usize,
    /// Reply audio bytes dropped because playback could not keep up
    pub dropped_audio: usize,
    /// Stream ended by idle timeout rather than by the server closing
    pub timed_out: bool,
}

/// Runs exchanges against the assistant server over any [`Transport`]
#[derive(Debug, Clone)]
pub struct SessionClient {
    server: ServerConfig,
    config: SessionConfig,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl SessionClient {
    #[must_use]
    pub const fn new(server: ServerConfig, config: SessionConfig) -> Self {
        Self {
            server,
            config,
            events: None,
        }
    }

    /// Report progress on `events`
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Upload `recording` and stream the reply audio into `play`
    ///
    /// The transport is always closed and [`SessionEvent::Finished`] always
    /// sent before returning.
    ///
    /// # Errors
    ///
    /// Returns error if the recording is empty, the server is unreachable, the
    /// upload fails or the reply stream breaks
    pub async fn exchange<T>(
        &self,
        transport: &mut T,
        recording: &[u8],
        play: &mut Producer,
    ) -> Result<SessionSummary>
    where
        T: Transport + ?Sized,
    {
        if recording.is_empty() {
            self.emit(SessionEvent::Finished);
            return Err(Error::Session("nothing recorded".to_string()));
        }
        let len = u32::try_from(recording.len())
            .map_err(|_| Error::Session(format!("recording too large: {}", recording.len())))?;

        self.status(SessionStatus::Connecting);
        let link = transport.name();
        if let Err(e) = transport.connect(&self.server.host, self.server.port).await {
            tracing::warn!(link, host = %self.server.host, port = self.server.port, error = %e, "server unreachable");
            self.status(SessionStatus::ServerUnreachable);
            tokio::time::sleep(self.config.failure_hold).await;
            self.finish(transport).await;
            return Err(e);
        }

        let result = self.run(transport, recording, len, play).await;

        if result.is_ok() {
            tokio::time::sleep(self.config.drain_delay).await;
        }
        self.finish(transport).await;

        match &result {
            Ok(summary) => tracing::info!(
                link,
                uploaded = summary.uploaded,
                audio = summary.audio_bytes,
                dropped = summary.dropped_audio,
                timed_out = summary.timed_out,
                "session finished"
            ),
            Err(e) => tracing::warn!(link, error = %e, "session failed"),
        }
        result
    }

    async fn run<T>(
        &self,
        transport: &mut T,
        recording: &[u8],
        len: u32,
        play: &mut Producer,
    ) -> Result<SessionSummary>
    where
        T: Transport + ?Sized,
    {
        let mut summary = SessionSummary::default();

        self.status(SessionStatus::Sending);
        transport.send(&len.to_be_bytes()).await?;
        transport.send(recording).await?;
        summary.uploaded = recording.len();
        tracing::debug!(bytes = recording.len(), "recording uploaded");

        self.status(SessionStatus::Thinking);
        let mut demux = ReplyDemux::new();
        let mut buf = vec![0u8; RECEIVE_CHUNK];
        let mut received_any = false;
        let mut replying = false;

        loop {
            let n = match transport
                .receive_chunk(&mut buf, self.config.stream_idle_timeout)
                .await
            {
                Ok(0) => break,
                Ok(n) => n,
                Err(Error::Timeout(_)) => {
                    summary.timed_out = true;
                    if !received_any {
                        self.status(SessionStatus::StreamTimeout);
                    }
                    break;
                }
                Err(e) => return Err(e),
            };
            received_any = true;

            let chunk = demux.feed(&buf[..n]);
            match chunk.directive {
                Some(Ok(directive)) => {
                    self.emit(SessionEvent::Directive(directive.clone()));
                    summary.directive = Some(directive);
                }
                Some(Err(e)) => tracing::warn!(error = %e, "ignoring malformed directive"),
                None => {}
            }

            if chunk.audio.is_empty() {
                continue;
            }
            if !replying {
                replying = true;
                self.status(SessionStatus::Replying);
            }

            let queued =
                push_with_backpressure(play, chunk.audio, self.config.backpressure_timeout).await;
            summary.audio_bytes += queued;
            if queued < chunk.audio.len() {
                let dropped = chunk.audio.len() - queued;
                summary.dropped_audio += dropped;
                tracing::warn!(dropped, "play buffer stalled, dropping reply audio");
            }
        }

        Ok(summary)
    }

    async fn finish<T>(&self, transport: &mut T)
    where
        T: Transport + ?Sized,
    {
        if let Err(e) = transport.close().await {
            tracing::debug!(error = %e, "close failed");
        }
        self.emit(SessionEvent::Finished);
    }

    fn status(&self, status: SessionStatus) {
        tracing::info!(status = status.as_str(), "session status");
        self.emit(SessionEvent::Status(status));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = events.send(event);
        }
    }
}

/// Push `data` into the play ring, waiting while it is full
///
/// Gives up once no space has opened for `timeout`; returns the bytes queued.
pub async fn push_with_backpressure(play: &mut Producer, data: &[u8], timeout: Duration) -> usize {
    let mut queued = 0;
    let mut stalled_since = tokio::time::Instant::now();

    while queued < data.len() {
        let n = play.push_slice(&data[queued..]);
        if n > 0 {
            queued += n;
            stalled_since = tokio::time::Instant::now();
            continue;
        }
        if stalled_since.elapsed() >= timeout {
            break;
        }
        tokio::time::sleep(BACKPRESSURE_POLL).await;
    }
    queued
}
