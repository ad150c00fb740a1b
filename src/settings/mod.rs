//! Persisted device settings and discovery history
//!
//! Stored as pretty-printed JSON under the config dir, one file per concern,
//! loaded synchronously at startup and written back after connection and
//! discovery events.

use crate::config::get_config_file_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{info, warn};

const SETTINGS_FILE: &str = "device-settings.json";
/// Most recent discovery runs kept on disk.
const DISCOVERY_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_discovery_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub discovery_history: Vec<DiscoveryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub at: DateTime<Utc>,
    pub device_class: String,
    pub candidates_found: usize,
    pub validated: usize,
}

pub struct SettingsStore {
    path: PathBuf,
    state: Mutex<DeviceSettings>,
}

impl SettingsStore {
    /// Open the default store under the config dir, loading any saved state.
    pub fn open() -> Self {
        Self::open_at(get_config_file_path(SETTINGS_FILE))
    }

    pub fn open_at(path: PathBuf) -> Self {
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<DeviceSettings>(&content) {
                Ok(settings) => {
                    info!(
                        "Loaded device settings from {} ({})",
                        path.display(),
                        settings.ip.as_deref().unwrap_or("no address")
                    );
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse device settings, starting fresh: {}", e);
                    DeviceSettings::default()
                }
            },
            Err(_) => DeviceSettings::default(),
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub async fn device(&self) -> DeviceSettings {
        self.state.lock().await.clone()
    }

    /// Record the configured target so the next start can reuse it.
    pub async fn set_target(&self, ip: &str, port: u16) {
        let mut state = self.state.lock().await;
        state.ip = Some(ip.to_string());
        state.port = Some(port);
        self.persist(&state);
    }

    pub async fn record_connected(&self) {
        let mut state = self.state.lock().await;
        state.last_connected_at = Some(Utc::now());
        state.failed_attempts = 0;
        self.persist(&state);
    }

    pub async fn record_failed_attempt(&self) {
        let mut state = self.state.lock().await;
        state.failed_attempts = state.failed_attempts.saturating_add(1);
        self.persist(&state);
    }

    pub async fn record_discovery(&self, device_class: &str, candidates_found: usize, validated: usize) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.last_discovery_at = Some(now);
        state.discovery_history.push(DiscoveryRecord {
            at: now,
            device_class: device_class.to_string(),
            candidates_found,
            validated,
        });
        let overflow = state.discovery_history.len().saturating_sub(DISCOVERY_HISTORY_LIMIT);
        if overflow > 0 {
            state.discovery_history.drain(..overflow);
        }
        self.persist(&state);
    }

    fn persist(&self, state: &DeviceSettings) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("Failed to save device settings: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize device settings: {}", e),
        }
    }
}
