//! Configuration management for the BMS telemetry node.
//!
//! The runtime configuration is a process-wide singleton: compiled-in
//! defaults, overridden by whatever keys the JSON config file carries.
//! Readers take value snapshots; the only writers are the INIT loader
//! and the HTTP config-save handler.

use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

mod kv;

pub use kv::KvStore;

/// Key in the persistent store that requests CONFIG mode on the next
/// processing check.
pub const CONFIG_MODE_KEY: &str = "config_mode";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("config io: {0}")]
    Io(#[from] io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Wi-Fi station settings. Empty `static_ip` means DHCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub pass: String,
    #[serde(default)]
    pub static_ip: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub netmask: String,
}

/// Broker endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub uri: String,
}

/// Battery limit settings used by the aggregator and the demo adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryLimits {
    pub cell_v_min: f32,
    pub cell_v_max: f32,
    pub pack_v_min: f32,
    pub pack_v_max: f32,
    pub current_min: f32,
    pub current_max: f32,
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub battery: BatteryLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wifi: WifiConfig {
                ssid: "bms-net".into(),
                pass: "bms-pass".into(),
                static_ip: String::new(),
                gateway: String::new(),
                netmask: String::new(),
            },
            mqtt: MqttConfig {
                uri: "mqtt://127.0.0.1:1883".into(),
            },
            battery: BatteryLimits {
                cell_v_min: 0.5,
                cell_v_max: 2.0,
                pack_v_min: 2.5,
                pack_v_max: 10.0,
                current_min: -5.0,
                current_max: 5.0,
            },
        }
    }
}

/// Overlay mirror of [`Config`]: every key optional, so a sparse file
/// overrides only what it names and defaults survive for the rest.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    wifi: Option<WifiOverlay>,
    mqtt: Option<MqttOverlay>,
    battery: Option<BatteryOverlay>,
}

#[derive(Debug, Default, Deserialize)]
struct WifiOverlay {
    ssid: Option<String>,
    pass: Option<String>,
    static_ip: Option<String>,
    gateway: Option<String>,
    netmask: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MqttOverlay {
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BatteryOverlay {
    cell_v_min: Option<f32>,
    cell_v_max: Option<f32>,
    pack_v_min: Option<f32>,
    pack_v_max: Option<f32>,
    current_min: Option<f32>,
    current_max: Option<f32>,
}

impl ConfigOverlay {
    fn apply(self, cfg: &mut Config) {
        if let Some(wifi) = self.wifi {
            if let Some(v) = wifi.ssid {
                cfg.wifi.ssid = v;
            }
            if let Some(v) = wifi.pass {
                cfg.wifi.pass = v;
            }
            if let Some(v) = wifi.static_ip {
                cfg.wifi.static_ip = v;
            }
            if let Some(v) = wifi.gateway {
                cfg.wifi.gateway = v;
            }
            if let Some(v) = wifi.netmask {
                cfg.wifi.netmask = v;
            }
        }
        if let Some(mqtt) = self.mqtt {
            if let Some(v) = mqtt.uri {
                cfg.mqtt.uri = v;
            }
        }
        if let Some(bat) = self.battery {
            if let Some(v) = bat.cell_v_min {
                cfg.battery.cell_v_min = v;
            }
            if let Some(v) = bat.cell_v_max {
                cfg.battery.cell_v_max = v;
            }
            if let Some(v) = bat.pack_v_min {
                cfg.battery.pack_v_min = v;
            }
            if let Some(v) = bat.pack_v_max {
                cfg.battery.pack_v_max = v;
            }
            if let Some(v) = bat.current_min {
                cfg.battery.current_min = v;
            }
            if let Some(v) = bat.current_max {
                cfg.battery.current_max = v;
            }
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Value snapshot of the current configuration.
pub fn snapshot() -> Config {
    CONFIG.read().clone()
}

/// Mutate the singleton in place. Used by the INIT loader and the HTTP
/// save handler; everything else reads snapshots.
pub fn update<F: FnOnce(&mut Config)>(f: F) {
    f(&mut CONFIG.write());
}

/// Reset the singleton to compiled-in defaults.
pub fn reset_to_defaults() {
    *CONFIG.write() = Config::default();
}

/// Load the JSON config file and overlay present keys onto the
/// singleton. Missing file or bad JSON leaves the singleton untouched.
pub fn load_from(path: &Path) -> Result<(), ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "config not found, using defaults");
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let overlay: ConfigOverlay = serde_json::from_str(&raw)?;
    overlay.apply(&mut CONFIG.write());
    info!(path = %path.display(), "config loaded");
    Ok(())
}

/// Write the current singleton as pretty JSON, atomically via a temp
/// file in the same directory.
pub fn save_to(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&snapshot())?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;

    info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_compiled_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.battery.cell_v_min, 0.5);
        assert_eq!(cfg.battery.cell_v_max, 2.0);
        assert_eq!(cfg.battery.current_min, -5.0);
        assert_eq!(cfg.battery.current_max, 5.0);
    }

    #[test]
    fn overlay_keeps_defaults_for_missing_keys() {
        let mut cfg = Config::default();
        let overlay: ConfigOverlay =
            serde_json::from_str(r#"{"battery":{"cell_v_max":4.2},"mqtt":{"uri":"mqtt://host"}}"#)
                .unwrap();
        overlay.apply(&mut cfg);

        assert_eq!(cfg.battery.cell_v_max, 4.2);
        assert_eq!(cfg.battery.cell_v_min, 0.5);
        assert_eq!(cfg.mqtt.uri, "mqtt://host");
        assert_eq!(cfg.wifi.ssid, Config::default().wifi.ssid);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        reset_to_defaults();
        update(|cfg| {
            cfg.wifi.ssid = "pack-lab".into();
            cfg.battery.pack_v_max = 21.0;
        });
        save_to(&path).unwrap();

        reset_to_defaults();
        load_from(&path).unwrap();
        let cfg = snapshot();
        assert_eq!(cfg.wifi.ssid, "pack-lab");
        assert_eq!(cfg.battery.pack_v_max, 21.0);

        reset_to_defaults();
    }

    #[test]
    fn load_missing_file_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
