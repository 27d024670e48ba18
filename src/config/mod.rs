//! Configuration management for the Beacon device
//!
//! Precedence: CLI flags > environment > TOML file > defaults.

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use file::DeviceConfigFile;

use crate::{Error, Result};

/// Device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Network link used for sessions
    pub link: LinkKind,

    /// Assistant server endpoint
    pub server: ServerConfig,

    /// Cellular modem configuration
    pub modem: ModemConfig,

    /// Audio pipeline configuration
    pub audio: AudioConfig,

    /// Session configuration
    pub session: SessionConfig,
}

/// Network link used to reach the assistant server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    /// Plain TCP socket (Wi-Fi or wired)
    #[default]
    Wifi,
    /// Cellular module over UART
    Cellular,
}

impl FromStr for LinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wifi" | "tcp" => Ok(Self::Wifi),
            "cellular" | "4g" | "modem" => Ok(Self::Cellular),
            other => Err(Error::Config(format!("unknown link kind: {other}"))),
        }
    }
}

/// Assistant server endpoint
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Cellular modem configuration
#[derive(Debug, Clone)]
pub struct ModemConfig {
    /// Serial device path
    pub serial_port: String,

    /// Baud rate the module is forced to after sync
    pub target_baud: u32,

    /// Baud rates probed in order
    pub baud_candidates: Vec<u32>,

    /// Access point name for the PDP context
    pub apn: String,

    /// Full probe cycles before the hardware reset fallback
    pub probe_cycles: u32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            target_baud: 115_200,
            baud_candidates: vec![115_200, 921_600, 460_800],
            apn: "cmnet".to_string(),
            probe_cycles: 5,
        }
    }
}

/// Audio pipeline configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate shared by capture, playback and the server
    pub sample_rate: u32,

    /// Idle time after the last decoded audio before the amplifier is cut
    pub silence_timeout: Duration,

    /// Play ring size in bytes of ADPCM
    pub play_buffer_size: usize,

    /// Record buffer size in bytes of ADPCM
    pub max_record_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            silence_timeout: Duration::from_millis(2000),
            play_buffer_size: 200 * 1024,
            max_record_bytes: 512 * 1024,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reply stream idle timeout
    pub stream_idle_timeout: Duration,

    /// Upload chunk size on the cellular link
    pub upload_chunk_size: usize,

    /// Pause after the reply so playback can catch up before closing
    pub drain_delay: Duration,

    /// How long a connection failure stays on screen
    pub failure_hold: Duration,

    /// Longest a push into a full play buffer may wait
    pub backpressure_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_idle_timeout: Duration::from_secs(5),
            upload_chunk_size: 1024,
            drain_delay: Duration::from_millis(500),
            failure_hold: Duration::from_secs(2),
            backpressure_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from the TOML file (if any) and the environment
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path);
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn resolve(fc: DeviceConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let link = env("BEACON_DEVICE_LINK")
            .or(fc.link)
            .map(|s| s.parse::<LinkKind>())
            .transpose()?
            .unwrap_or_default();

        let port = match env("BEACON_DEVICE_SERVER_PORT") {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| Error::Config(format!("invalid server port: {raw}")))?,
            ),
            None => fc.server.port,
        };
        let server = ServerConfig {
            host: env("BEACON_DEVICE_SERVER_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: port.unwrap_or(8080),
        };

        let defaults = ModemConfig::default();
        let modem = ModemConfig {
            serial_port: env("BEACON_DEVICE_SERIAL_PORT")
                .or(fc.modem.serial_port)
                .unwrap_or(defaults.serial_port),
            target_baud: fc.modem.target_baud.unwrap_or(defaults.target_baud),
            baud_candidates: fc
                .modem
                .baud_candidates
                .unwrap_or(defaults.baud_candidates),
            apn: env("BEACON_DEVICE_APN")
                .or(fc.modem.apn)
                .unwrap_or(defaults.apn),
            probe_cycles: fc.modem.probe_cycles.unwrap_or(defaults.probe_cycles),
        };

        let defaults = AudioConfig::default();
        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.sample_rate),
            silence_timeout: fc
                .audio
                .silence_timeout_ms
                .map_or(defaults.silence_timeout, Duration::from_millis),
            play_buffer_size: fc
                .audio
                .play_buffer_size
                .unwrap_or(defaults.play_buffer_size),
            max_record_bytes: fc
                .audio
                .max_record_bytes
                .unwrap_or(defaults.max_record_bytes),
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            stream_idle_timeout: fc
                .session
                .stream_idle_timeout_ms
                .map_or(defaults.stream_idle_timeout, Duration::from_millis),
            upload_chunk_size: fc
                .session
                .upload_chunk_size
                .unwrap_or(defaults.upload_chunk_size),
            ..defaults
        };

        let config = Self {
            link,
            server,
            modem,
            audio,
            session,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.modem.baud_candidates.is_empty() {
            return Err(Error::Config("modem.baud_candidates is empty".to_string()));
        }
        if self.modem.target_baud == 0 {
            return Err(Error::Config("modem.target_baud must be non-zero".to_string()));
        }
        if self.audio.play_buffer_size < 2 {
            return Err(Error::Config(
                "audio.play_buffer_size must be at least 2".to_string(),
            ));
        }
        if self.session.upload_chunk_size == 0 {
            return Err(Error::Config(
                "session.upload_chunk_size must be non-zero".to_string(),
            ));
        }
        if self.server.host.is_empty() {
            return Err(Error::Config("server.host is empty".to_string()));
        }
        Ok(())
    }
}
