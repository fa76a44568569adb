//! Bridge configuration – reads/writes `~/.arbridge/config.toml`.

use arbridge_perception::{DeclinationCorrection, LocationSample};
use arbridge_runtime::aggregator::{
    DEFAULT_ALTITUDE, DEFAULT_LATITUDE, DEFAULT_LONGITUDE, DEFAULT_SEA_LEVEL_PRESSURE_HPA,
};
use arbridge_runtime::scheduler::DEFAULT_PUBLISH_RATE_HZ;
use arbridge_runtime::{FrameConfig, FusionConfig, SchedulerConfig};
use arbridge_types::BridgeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_publish_rate_hz")]
    pub publish_rate_hz: f64,

    /// Reference pressure for barometric altitude (hPa).
    #[serde(default = "default_sea_level_pressure_hpa")]
    pub sea_level_pressure_hpa: f32,

    /// Location published until the first fix arrives.
    #[serde(default = "default_latitude")]
    pub default_latitude: f64,
    #[serde(default = "default_longitude")]
    pub default_longitude: f64,
    #[serde(default = "default_altitude")]
    pub default_altitude: f64,

    /// WebSocket port of the rosbridge relay.
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    #[serde(default = "default_true")]
    pub relay_enabled: bool,

    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_odom_frame")]
    pub odom_frame: String,
    #[serde(default = "default_device_frame")]
    pub child_frame: String,
    #[serde(default = "default_device_frame")]
    pub sensor_frame: String,

    #[serde(default)]
    pub declination_correction: DeclinationCorrection,

    /// Seconds of silence before a sensor stream is reported stale.
    #[serde(default = "default_stale_stream_secs")]
    pub stale_stream_secs: f64,
}

fn default_publish_rate_hz() -> f64 {
    DEFAULT_PUBLISH_RATE_HZ
}
fn default_sea_level_pressure_hpa() -> f32 {
    DEFAULT_SEA_LEVEL_PRESSURE_HPA
}
fn default_latitude() -> f64 {
    DEFAULT_LATITUDE
}
fn default_longitude() -> f64 {
    DEFAULT_LONGITUDE
}
fn default_altitude() -> f64 {
    DEFAULT_ALTITUDE
}
fn default_relay_port() -> u16 {
    9090
}
fn default_true() -> bool {
    true
}
fn default_topic_prefix() -> String {
    "android".to_string()
}
fn default_odom_frame() -> String {
    "odom".to_string()
}
fn default_device_frame() -> String {
    "android".to_string()
}
fn default_stale_stream_secs() -> f64 {
    5.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publish_rate_hz: default_publish_rate_hz(),
            sea_level_pressure_hpa: default_sea_level_pressure_hpa(),
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            default_altitude: default_altitude(),
            relay_port: default_relay_port(),
            relay_enabled: true,
            topic_prefix: default_topic_prefix(),
            odom_frame: default_odom_frame(),
            child_frame: default_device_frame(),
            sensor_frame: default_device_frame(),
            declination_correction: DeclinationCorrection::default(),
            stale_stream_secs: default_stale_stream_secs(),
        }
    }
}

impl Config {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            odom_frame: self.odom_frame.clone(),
            child_frame: self.child_frame.clone(),
            sensor_frame: self.sensor_frame.clone(),
        }
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig, BridgeError> {
        SchedulerConfig::from_rate_hz(self.publish_rate_hz, self.frame_config())
    }

    pub fn fusion_config(&self) -> Result<FusionConfig, BridgeError> {
        let stale_after = Duration::try_from_secs_f64(self.stale_stream_secs)
            .map_err(|e| BridgeError::Config(format!("stale_stream_secs: {e}")))?;
        let fusion = FusionConfig {
            sea_level_pressure_hpa: self.sea_level_pressure_hpa,
            default_location: LocationSample::fallback(
                self.default_latitude,
                self.default_longitude,
                self.default_altitude,
            ),
            declination_correction: self.declination_correction,
            stale_after,
        };
        fusion.validate()?;
        Ok(fusion)
    }
}

/// Return the path to `~/.arbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".arbridge").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ARBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ARBRIDGE_PUBLISH_RATE_HZ` | `publish_rate_hz` |
/// | `ARBRIDGE_SEA_LEVEL_PRESSURE_HPA` | `sea_level_pressure_hpa` |
/// | `ARBRIDGE_RELAY_PORT` | `relay_port` |
///
/// Unparsable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("ARBRIDGE_PUBLISH_RATE_HZ")
        && let Ok(rate) = v.trim().parse::<f64>()
    {
        cfg.publish_rate_hz = rate;
    }
    if let Some(v) = var("ARBRIDGE_SEA_LEVEL_PRESSURE_HPA")
        && let Ok(p) = v.trim().parse::<f32>()
    {
        cfg.sea_level_pressure_hpa = p;
    }
    if let Some(v) = var("ARBRIDGE_RELAY_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.relay_port = port;
    }
}

/// Save the config to disk, creating `~/.arbridge/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
