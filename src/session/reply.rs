//! Reply stream demultiplexing
//!
//! The server answers with the control directive as hex-encoded JSON
//! terminated by `*`, then raw ADPCM until the stream ends. CR and LF inside
//! the hex section are ignored.

use super::directive::ControlDirective;
use crate::{Error, Result};

/// Directive terminator
const HEX_TERMINATOR: u8 = b'*';

/// Hex characters kept before the rest of an oversized directive is dropped
const MAX_HEX_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPhase {
    /// Accumulating the hex directive
    ControlHex,
    /// Passing audio through
    Audio,
}

/// What one chunk of reply stream contained
#[derive(Debug, Default)]
pub struct ReplyChunk<'a> {
    /// Directive completed in this chunk; `Some(Err)` if it failed to parse
    pub directive: Option<Result<ControlDirective>>,
    /// Audio bytes that followed
    pub audio: &'a [u8],
}

/// Per-session reply parser
#[derive(Debug)]
pub struct ReplyDemux {
    phase: ReplyPhase,
    hex: Vec<u8>,
    truncated: bool,
}

impl Default for ReplyDemux {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyDemux {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: ReplyPhase::ControlHex,
            hex: Vec::new(),
            truncated: false,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> ReplyPhase {
        self.phase
    }

    /// Split a received chunk into directive and audio
    pub fn feed<'a>(&mut self, chunk: &'a [u8]) -> ReplyChunk<'a> {
        if self.phase == ReplyPhase::Audio {
            return ReplyChunk {
                directive: None,
                audio: chunk,
            };
        }

        for (i, &byte) in chunk.iter().enumerate() {
            match byte {
                HEX_TERMINATOR => {
                    self.phase = ReplyPhase::Audio;
                    let directive = self.finish_directive();
                    return ReplyChunk {
                        directive: Some(directive),
                        audio: &chunk[i + 1..],
                    };
                }
                b'\r' | b'\n' => {}
                _ if self.hex.len() < MAX_HEX_LEN => self.hex.push(byte),
                _ => self.truncated = true,
            }
        }

        ReplyChunk::default()
    }

    fn finish_directive(&mut self) -> Result<ControlDirective> {
        let hex = std::mem::take(&mut self.hex);
        if self.truncated {
            return Err(Error::Protocol(format!(
                "directive longer than {MAX_HEX_LEN} hex characters"
            )));
        }
        let json = hex::decode(&hex)?;
        tracing::debug!(json = %String::from_utf8_lossy(&json), "control directive");
        ControlDirective::from_json(&json)
    }
}
