//! Configuration management

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub avr: Option<AvrConfig>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

fn default_port() -> u16 {
    8590
}

/// AVR connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct AvrConfig {
    pub host: String,
    #[serde(default = "default_avr_port")]
    pub port: u16,
    /// Feature flag: when false the session runs in simulated fallback mode
    /// and never opens a socket. Read once at session construction.
    #[serde(default = "default_true")]
    pub enable_real_connection: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_avr_port() -> u16 {
    23
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_command_timeout_ms() -> u64 {
    3000
}

/// Discovery heuristics.
///
/// The thresholds and last-octet priors are tuned to one reference household
/// network; they are kept configurable rather than hard-coded for that
/// reason. Bounds are exclusive on both ends.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_avr_threshold")]
    pub avr_confidence_threshold: f32,
    #[serde(default = "default_tv_threshold")]
    pub tv_confidence_threshold: f32,
    #[serde(default = "default_avr_octet_low")]
    pub avr_octet_low: u8,
    #[serde(default = "default_avr_octet_high")]
    pub avr_octet_high: u8,
    #[serde(default = "default_tv_octet_low")]
    pub tv_octet_low: u8,
    #[serde(default = "default_tv_octet_high")]
    pub tv_octet_high: u8,
    /// Handshake timeout used during interactive discovery. Deliberately
    /// shorter than the session's steady-state command timeout.
    #[serde(default = "default_validate_timeout_ms")]
    pub validate_timeout_ms: u64,
}

fn default_avr_threshold() -> f32 {
    0.2
}

fn default_tv_threshold() -> f32 {
    0.3
}

fn default_avr_octet_low() -> u8 {
    90
}

fn default_avr_octet_high() -> u8 {
    110
}

fn default_tv_octet_low() -> u8 {
    100
}

fn default_tv_octet_high() -> u8 {
    130
}

fn default_validate_timeout_ms() -> u64 {
    1500
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            avr_confidence_threshold: default_avr_threshold(),
            tv_confidence_threshold: default_tv_threshold(),
            avr_octet_low: default_avr_octet_low(),
            avr_octet_high: default_avr_octet_high(),
            tv_octet_low: default_tv_octet_low(),
            tv_octet_high: default_tv_octet_high(),
            validate_timeout_ms: default_validate_timeout_ms(),
        }
    }
}

/// Get config directory (AVLINK_CONFIG_DIR or platform default)
pub fn get_config_dir() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("AVLINK_CONFIG_DIR") {
        return std::path::PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return std::path::PathBuf::from(home).join("Library/Application Support/avlink");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return std::path::PathBuf::from(xdg).join("avlink");
        }
        if let Ok(home) = std::env::var("HOME") {
            return std::path::PathBuf::from(home).join(".config/avlink");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return std::path::PathBuf::from(appdata).join("avlink");
        }
    }

    // Fallback to current directory
    std::path::PathBuf::from(".")
}

/// Get the path for a config file
pub fn get_config_file_path(filename: &str) -> std::path::PathBuf {
    get_config_dir().join(filename)
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        .set_default("port", 8590)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (AVLINK_PORT, AVLINK_AVR__HOST, etc.)
        .add_source(
            ::config::Environment::with_prefix("AVLINK")
                .separator("__")
                .try_parsing(true),
        );

    // Explicit precedence for the listen port: AVLINK_PORT > PORT > config > default
    if let Ok(port) = std::env::var("AVLINK_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    } else if let Ok(port) = std::env::var("PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    }

    // AVR_HOST/AVR_PORT shortcuts (used by container deploys without a config file)
    if let Ok(host) = std::env::var("AVR_HOST") {
        builder = builder.set_override("avr.host", host)?;
    }
    if let Ok(port) = std::env::var("AVR_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("avr.port", port_num as i64)?;
        }
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}
