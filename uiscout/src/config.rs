use crate::errors::AutomationError;
use crate::screenshot::default_screenshot_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Durations as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub default_retry_interval: Duration,
    /// Listen for human input and hold automation while the operator is active.
    pub human_interruption_detection: bool,
    #[serde(with = "duration_secs")]
    pub human_cooldown_period: Duration,
    /// Mask values of sensitive actions in logs and notifications.
    pub secure_mode: bool,
    pub log_level: String,
    pub screenshot_dir: PathBuf,
    pub screenshots_enabled: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            default_retry_interval: Duration::from_millis(500),
            human_interruption_detection: false,
            human_cooldown_period: Duration::from_secs(5),
            secure_mode: false,
            log_level: "info".to_string(),
            screenshot_dir: default_screenshot_dir(),
            screenshots_enabled: true,
        }
    }
}

impl ControllerConfig {
    /// Reads a `.json`, `.yaml` or `.yml` file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(serde_json::from_str(&text)?),
            "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| {
                AutomationError::InvalidArgument(format!("Invalid YAML in {}: {e}", path.display()))
            }),
            other => Err(AutomationError::InvalidArgument(format!(
                "Unsupported config format '{other}' for {}",
                path.display()
            ))),
        }
    }

    /// Defaults with `UISCOUT_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `UISCOUT_*` overrides from `lookup`. Unparseable values are
    /// ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn secs(key: &str, raw: &str) -> Option<Duration> {
            match raw.trim().parse::<f64>().ok().and_then(|s| Duration::try_from_secs_f64(s).ok()) {
                Some(d) => Some(d),
                None => {
                    warn!("Ignoring {key}={raw}: expected seconds");
                    None
                }
            }
        }
        fn flag(key: &str, raw: &str) -> Option<bool> {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => {
                    warn!("Ignoring {key}={raw}: expected a boolean");
                    None
                }
            }
        }

        if let Some(v) = lookup("UISCOUT_DEFAULT_TIMEOUT").and_then(|r| secs("UISCOUT_DEFAULT_TIMEOUT", &r)) {
            self.default_timeout = v;
        }
        if let Some(v) = lookup("UISCOUT_RETRY_INTERVAL").and_then(|r| secs("UISCOUT_RETRY_INTERVAL", &r)) {
            self.default_retry_interval = v;
        }
        if let Some(v) = lookup("UISCOUT_HUMAN_DETECTION").and_then(|r| flag("UISCOUT_HUMAN_DETECTION", &r)) {
            self.human_interruption_detection = v;
        }
        if let Some(v) = lookup("UISCOUT_HUMAN_COOLDOWN").and_then(|r| secs("UISCOUT_HUMAN_COOLDOWN", &r)) {
            self.human_cooldown_period = v;
        }
        if let Some(v) = lookup("UISCOUT_SECURE_MODE").and_then(|r| flag("UISCOUT_SECURE_MODE", &r)) {
            self.secure_mode = v;
        }
        if let Some(v) = lookup("UISCOUT_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("UISCOUT_SCREENSHOT_DIR") {
            self.screenshot_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("UISCOUT_SCREENSHOTS").and_then(|r| flag("UISCOUT_SCREENSHOTS", &r)) {
            self.screenshots_enabled = v;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.default_retry_interval, Duration::from_millis(500));
        assert_eq!(config.human_cooldown_period, Duration::from_secs(5));
        assert!(!config.secure_mode);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn yaml_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.yaml");
        std::fs::write(&path, "default_timeout: 2.5\nsecure_mode: true\n").unwrap();
        let config = ControllerConfig::from_file(&path).unwrap();
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert!(config.secure_mode);
        assert_eq!(config.default_retry_interval, Duration::from_millis(500));
    }

    #[test]
    fn json_file_and_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.json");
        std::fs::write(&path, r#"{"default_retry_interval": 0.1, "log_level": "debug"}"#).unwrap();
        let config = ControllerConfig::from_file(&path).unwrap();
        assert_eq!(config.default_retry_interval, Duration::from_millis(100));
        assert_eq!(config.log_level, "debug");

        let bad = dir.path().join("scout.toml");
        std::fs::write(&bad, "x = 1").unwrap();
        assert!(ControllerConfig::from_file(&bad).is_err());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("UISCOUT_DEFAULT_TIMEOUT", "3"),
            ("UISCOUT_SECURE_MODE", "yes"),
            ("UISCOUT_RETRY_INTERVAL", "soon"),
        ]
        .into_iter()
        .collect();
        let config = ControllerConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.default_timeout, Duration::from_secs(3));
        assert!(config.secure_mode);
        assert_eq!(config.default_retry_interval, Duration::from_millis(500));
    }
}
