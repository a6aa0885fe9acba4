//! TOML-based application configuration.
//!
//! Stores the session owner and the timer durations at
//! `~/.config/focal/config.toml`. Missing fields fall back to defaults, and
//! the file is written on first run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::TimerConfig;

/// Session ownership configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The single user this installation tracks.
    #[serde(default = "default_user_id")]
    pub user_id: i64,
}

fn default_user_id() -> i64 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/focal/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub timer: TimerConfig,
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::DataDir(e.to_string()))?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing defaults on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| {
                    ConfigError::LoadFailed {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Enforce the timing invariants before the engine sees the values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timer = &self.timer;
        if timer.planned_focus_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                key: "timer.planned_focus_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        if timer.break_increment_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                key: "timer.break_increment_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        if timer.break_budget_minutes < 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.break_budget_minutes".into(),
                message: "must not be negative".into(),
            });
        }
        if timer.break_budget_minutes % timer.break_increment_minutes != 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.break_budget_minutes".into(),
                message: format!(
                    "must be a multiple of break_increment_minutes ({})",
                    timer.break_increment_minutes
                ),
            });
        }
        Ok(())
    }

    /// Read a value by dotted key path, e.g. `timer.planned_focus_minutes`.
    pub fn get(&self, key: &str) -> Option<String> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(match current {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Set a value by dotted key path and re-validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut root =
            serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
                key: key.into(),
                message: e.to_string(),
            })?;

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.into()));
        }

        let mut current = &mut root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.into()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.into()))?;
                let new_value = match existing {
                    serde_json::Value::Number(_) => {
                        let n: i64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                            key: key.into(),
                            message: format!("cannot parse '{value}' as integer"),
                        })?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Bool(_) => {
                        serde_json::Value::Bool(value.parse().map_err(|_| {
                            ConfigError::InvalidValue {
                                key: key.into(),
                                message: format!("cannot parse '{value}' as bool"),
                            }
                        })?)
                    }
                    _ => serde_json::Value::String(value.into()),
                };
                obj.insert(part.to_string(), new_value);
                break;
            }
            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.into()))?;
        }

        let updated: Config =
            serde_json::from_value(root).map_err(|e| ConfigError::InvalidValue {
                key: key.into(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
