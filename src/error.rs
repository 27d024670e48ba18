//! Error types for the Beacon device core

use thiserror::Error;

/// Result type alias for device operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the device core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Modem control error (UART or power sequencing)
    #[error("modem error: {0}")]
    Modem(String),

    /// Transport error (connect, send, receive)
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation did not complete before its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Session error (record/upload/reply exchange)
    #[error("session error: {0}")]
    Session(String),

    /// Malformed data on the reply stream
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Infrared hand-off error
    #[error("ir error: {0}")]
    Ir(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Hex decoding error
    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}
