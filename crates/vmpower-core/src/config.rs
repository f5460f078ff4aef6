//! Sampler configuration.
//!
//! Defaults reproduce the stock tool invocations; a JSON file may override any
//! subset of fields.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};

/// Driver tag used when none is configured.
pub const DEFAULT_COMPUTE_DRIVER: &str = "libvirt.LibvirtDriver";

/// How external tools get root privileges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Elevation {
    /// Use `sudo -n` unless already running as root.
    #[default]
    Auto,
    /// Always prefix `sudo -n`.
    Sudo,
    /// Run tools directly.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Active virtualization driver. Tags samples; does not change fetch logic.
    pub compute_driver: String,
    pub elevation: Elevation,
    /// Measurement window handed to `cpufreq-aperf -i`.
    pub frequency_window_secs: u32,
    /// Sensor class queried through `ipmitool sdr type`.
    pub temperature_sensor_type: String,
    /// Set to false on hosts without an NVIDIA GPU.
    pub gpu_enabled: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            compute_driver: DEFAULT_COMPUTE_DRIVER.to_string(),
            elevation: Elevation::Auto,
            frequency_window_secs: 1,
            temperature_sensor_type: "Temperature".to_string(),
            gpu_enabled: true,
        }
    }
}

impl SamplerConfig {
    /// Load a config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SamplerError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| SamplerError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate().map_err(|reason| SamplerError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.frequency_window_secs == 0 {
            return Err("frequency_window_secs must be at least 1".to_string());
        }
        if self.temperature_sensor_type.trim().is_empty() {
            return Err("temperature_sensor_type must not be empty".to_string());
        }
        Ok(())
    }
}
