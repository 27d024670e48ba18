//! Beacon Device - Voice-assistant device core
//!
//! This library provides the core functionality for a Beacon voice device:
//! - Audio pipeline (ADPCM capture/encode, decode/playback)
//! - Cellular modem transport (AT-command sync, TCP, inbound demultiplexing)
//! - Transport-agnostic session client (record → upload → streamed reply)
//! - IR code hand-off from server directives
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Microphone / Speaker                 │
//! │     Recorder (ADPCM encode)  │  Playback (decode)    │
//! └───────────┬─────────────────────────────▲───────────┘
//!             │ record buffer               │ play ring
//! ┌───────────▼─────────────────────────────┴───────────┐
//! │                   Session client                     │
//! │   length + ADPCM upload  │  hex directive + audio    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Transport
//! ┌────────────────────▼────────────────────────────────┐
//! │        TCP (Wi-Fi)   │   Cellular modem (UART/AT)    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod ir;
pub mod modem;
pub mod ring;
pub mod session;
pub mod transport;

pub use config::{Config, LinkKind};
pub use error::{Error, Result};
pub use modem::{Modem, ModemHealth, ModemState};
pub use ring::{Consumer, Producer, ring_buffer};
pub use session::{ControlDirective, SessionClient, SessionEvent, SessionStatus, SessionSummary};
pub use transport::{CellularTransport, TcpTransport, Transport};
