//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Engine timing (tick interval, fades, snooze length)
//! - Sunrise defaults and torch pulse thresholds
//! - Audio fade granularity and the default alarm sound
//! - Which sysfs backlight and LED to drive
//!
//! Configuration is stored at `~/.config/dawnlight/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::alarm::{AlarmSound, EngineSettings, DEFAULT_SUNRISE_MINUTES};
use crate::ambient::LightPolicy;
use crate::audio::FadeSteps;
use crate::error::ConfigError;

/// Engine timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_ring_fade_in_secs")]
    pub ring_fade_in_secs: u64,
    #[serde(default = "default_dismiss_fade_out_secs")]
    pub dismiss_fade_out_secs: u64,
    #[serde(default = "default_snooze_minutes")]
    pub default_snooze_minutes: u32,
    /// Minutes after the ring time a missed alarm may still ring. 0 = no limit.
    #[serde(default = "default_late_ring_limit_minutes")]
    pub late_ring_limit_minutes: u32,
}

/// Sunrise configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SunriseConfig {
    /// Sunrise length for new alarms.
    #[serde(default = "default_sunrise_minutes")]
    pub default_duration_minutes: u32,
    #[serde(default = "default_pulse_start")]
    pub pulse_start: f64,
    #[serde(default = "default_steady_at")]
    pub steady_at: f64,
    #[serde(default = "default_max_pulse_period_ms")]
    pub max_pulse_period_ms: u64,
    #[serde(default = "default_min_pulse_period_ms")]
    pub min_pulse_period_ms: u64,
}

/// Audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_fade_in_steps")]
    pub fade_in_steps: u32,
    #[serde(default = "default_fade_out_steps")]
    pub fade_out_steps: u32,
    /// Sound for new alarms.
    #[serde(default)]
    pub default_sound: AlarmSound,
    /// Directory holding the sound files. `None` is `sounds/` in the data directory.
    #[serde(default)]
    pub sounds_dir: Option<String>,
}

/// Device selection. `None` picks the first device found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicesConfig {
    #[serde(default)]
    pub backlight: Option<String>,
    #[serde(default)]
    pub led: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/dawnlight/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sunrise: SunriseConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
}

// Default functions
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_ring_fade_in_secs() -> u64 {
    30
}
fn default_dismiss_fade_out_secs() -> u64 {
    2
}
fn default_snooze_minutes() -> u32 {
    9
}
fn default_late_ring_limit_minutes() -> u32 {
    60
}
fn default_sunrise_minutes() -> u32 {
    DEFAULT_SUNRISE_MINUTES
}
fn default_pulse_start() -> f64 {
    LightPolicy::default().pulse_start
}
fn default_steady_at() -> f64 {
    LightPolicy::default().steady_at
}
fn default_max_pulse_period_ms() -> u64 {
    LightPolicy::default().max_period_ms
}
fn default_min_pulse_period_ms() -> u64 {
    LightPolicy::default().min_period_ms
}
fn default_fade_in_steps() -> u32 {
    FadeSteps::default().fade_in
}
fn default_fade_out_steps() -> u32 {
    FadeSteps::default().fade_out
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            ring_fade_in_secs: default_ring_fade_in_secs(),
            dismiss_fade_out_secs: default_dismiss_fade_out_secs(),
            default_snooze_minutes: default_snooze_minutes(),
            late_ring_limit_minutes: default_late_ring_limit_minutes(),
        }
    }
}

impl Default for SunriseConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: default_sunrise_minutes(),
            pulse_start: default_pulse_start(),
            steady_at: default_steady_at(),
            max_pulse_period_ms: default_max_pulse_period_ms(),
            min_pulse_period_ms: default_min_pulse_period_ms(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fade_in_steps: default_fade_in_steps(),
            fade_out_steps: default_fade_out_steps(),
            default_sound: AlarmSound::default(),
            sounds_dir: None,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Path of the config file in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing the defaults there when the file is missing.
    ///
    /// # Errors
    /// See [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// See [`Config::save`].
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. The previous value is kept when
    /// the new one is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Flattened `key = value` pairs for every leaf setting.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Names the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        let s = &self.sunrise;
        if self.engine.tick_interval_ms == 0 {
            return invalid("engine.tick_interval_ms", "must be greater than zero");
        }
        if self.engine.default_snooze_minutes == 0 {
            return invalid("engine.default_snooze_minutes", "must be greater than zero");
        }
        if s.default_duration_minutes == 0 {
            return invalid("sunrise.default_duration_minutes", "must be greater than zero");
        }
        if !(0.0..=1.0).contains(&s.pulse_start) || !(0.0..=1.0).contains(&s.steady_at) {
            return invalid("sunrise.pulse_start", "thresholds must lie in [0, 1]");
        }
        if s.pulse_start > s.steady_at {
            return invalid("sunrise.steady_at", "must not be below sunrise.pulse_start");
        }
        if s.min_pulse_period_ms == 0 || s.min_pulse_period_ms > s.max_pulse_period_ms {
            return invalid("sunrise.min_pulse_period_ms", "must be in 1..=max_pulse_period_ms");
        }
        if self.audio.fade_in_steps == 0 || self.audio.fade_out_steps == 0 {
            return invalid("audio.fade_in_steps", "fade step counts must be greater than zero");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let e = &self.engine;
        EngineSettings {
            tick_interval: Duration::from_millis(e.tick_interval_ms.max(1)),
            ring_fade_in: Duration::from_secs(e.ring_fade_in_secs),
            silence_fade_out: Duration::from_secs(e.dismiss_fade_out_secs),
            default_snooze_minutes: e.default_snooze_minutes.max(1),
            late_ring_limit: (e.late_ring_limit_minutes > 0)
                .then(|| chrono::Duration::minutes(i64::from(e.late_ring_limit_minutes))),
        }
    }

    pub fn light_policy(&self) -> LightPolicy {
        LightPolicy {
            pulse_start: self.sunrise.pulse_start,
            steady_at: self.sunrise.steady_at,
            max_period_ms: self.sunrise.max_pulse_period_ms,
            min_period_ms: self.sunrise.min_pulse_period_ms,
        }
    }

    pub fn fade_steps(&self) -> FadeSteps {
        FadeSteps {
            fade_in: self.audio.fade_in_steps,
            fade_out: self.audio.fade_out_steps,
        }
    }

    /// Where alarm sound files are read from.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn sounds_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.audio.sounds_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(data_dir()?.join("sounds")),
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
