//! Scheduler configuration.

use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Environment variable overriding the nominal cycle period, in milliseconds.
pub const PERIOD_ENV: &str = "CMDSCHED_PERIOD_MS";

/// Environment variable overriding whether trigger polling starts enabled.
pub const ENABLED_ENV: &str = "CMDSCHED_ENABLED";

/// Environment variable overriding the scheduler name used in log fields.
pub const NAME_ENV: &str = "CMDSCHED_NAME";

/// Configuration for a scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Nominal time between `run()` calls, as driven by the external loop.
    pub period: Duration,
    /// Whether trigger polling is enabled when the scheduler is created.
    pub enabled: bool,
    /// Name attached to log records.
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(20),
            enabled: true,
            name: "scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config from defaults overridden by `CMDSCHED_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a config from defaults overridden by the given lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(PERIOD_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                SchedulerError::Config(format!("{PERIOD_ENV} must be an integer, got {raw:?}"))
            })?;
            if millis == 0 {
                return Err(SchedulerError::Config(format!(
                    "{PERIOD_ENV} must be greater than zero"
                )));
            }
            config.period = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENABLED_ENV) {
            config.enabled = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(SchedulerError::Config(format!(
                        "{ENABLED_ENV} must be a boolean, got {raw:?}"
                    )))
                }
            };
        }

        if let Some(raw) = lookup(NAME_ENV) {
            if !raw.trim().is_empty() {
                config.name = raw.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Sets the cycle period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets whether trigger polling starts enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the scheduler name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the nominal loop frequency in hertz.
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();

        assert_eq!(config.period, Duration::from_millis(20));
        assert!(config.enabled);
        assert_eq!(config.name, "scheduler");
        assert!((config.frequency_hz() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::new()
            .with_period(Duration::from_millis(10))
            .with_enabled(false)
            .with_name("teleop");

        assert_eq!(config.period, Duration::from_millis(10));
        assert!(!config.enabled);
        assert_eq!(config.name, "teleop");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SchedulerConfig::from_lookup(lookup(&[
            (PERIOD_ENV, "10"),
            (ENABLED_ENV, "off"),
            (NAME_ENV, "auto"),
        ]))
        .unwrap();

        assert_eq!(config.period, Duration::from_millis(10));
        assert!(!config.enabled);
        assert_eq!(config.name, "auto");
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = SchedulerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.period, Duration::from_millis(20));
        assert!(config.enabled);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let result = SchedulerConfig::from_lookup(lookup(&[(PERIOD_ENV, "fast")]));
        assert!(matches!(result, Err(SchedulerError::Config(_))));

        let result = SchedulerConfig::from_lookup(lookup(&[(PERIOD_ENV, "0")]));
        assert!(matches!(result, Err(SchedulerError::Config(_))));

        let result = SchedulerConfig::from_lookup(lookup(&[(ENABLED_ENV, "maybe")]));
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }
}
