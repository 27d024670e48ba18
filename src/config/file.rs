//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-device/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DeviceConfigFile {
    /// Network link to use ("wifi" or "cellular")
    #[serde(default)]
    pub link: Option<String>,

    /// Assistant server endpoint
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Cellular modem configuration
    #[serde(default)]
    pub modem: ModemFileConfig,

    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Session (upload/reply) configuration
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Assistant server endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Cellular modem configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModemFileConfig {
    /// Serial device path (e.g. "/dev/ttyUSB2")
    pub serial_port: Option<String>,

    /// Baud rate the module is forced to after sync
    pub target_baud: Option<u32>,

    /// Baud rates probed in order during sync
    pub baud_candidates: Option<Vec<u32>>,

    /// Access point name for the PDP context
    pub apn: Option<String>,

    /// Full probe cycles before the hardware reset fallback
    pub probe_cycles: Option<u32>,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    pub silence_timeout_ms: Option<u64>,
    pub play_buffer_size: Option<usize>,
    pub max_record_bytes: Option<usize>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Reply stream idle timeout before the stream is considered finished
    pub stream_idle_timeout_ms: Option<u64>,

    /// Upload chunk size on the cellular link
    pub upload_chunk_size: Option<usize>,
}

/// Load a TOML config file
///
/// Uses `path` when given, otherwise the standard location. Returns
/// `DeviceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> DeviceConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return DeviceConfigFile::default();
    };

    if !path.exists() {
        return DeviceConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DeviceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DeviceConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-device/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-device")
            .join("config.toml")
    })
}
