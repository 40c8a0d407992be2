use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Tunables for the conversation engine and the join simulator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Real occupants at or above this count stop the engine.
    pub auto_deactivate_threshold: usize,
    /// Maximum conversations playing at once in one room.
    pub max_concurrent_conversations: usize,
    /// Idle gap between a conversation finishing and the next launch.
    pub gap_min: Duration,
    pub gap_max: Duration,
    /// Upper bound on the repeat-avoidance window.
    pub recent_cap: usize,
    /// Repeat-avoidance window as a share of the catalog size.
    pub recent_ratio: f64,
    /// Interval between simulated join notifications.
    pub join_interval_min: Duration,
    pub join_interval_max: Duration,
    /// One extra notification shortly after the join simulator starts.
    pub join_initial_delay: Option<Duration>,
    /// Upper bound on a single send or presence write.
    pub collaborator_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_deactivate_threshold: 10,
            max_concurrent_conversations: 4,
            gap_min: Duration::from_secs(30),
            gap_max: Duration::from_secs(90),
            recent_cap: 20,
            recent_ratio: 0.3,
            join_interval_min: Duration::from_secs(120),
            join_interval_max: Duration::from_secs(180),
            join_initial_delay: Some(Duration::from_secs(5)),
            collaborator_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> EngineResult<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();
        let config = Self {
            auto_deactivate_threshold: parse_var(
                "PRESENCE_AUTO_DEACTIVATE_THRESHOLD",
                defaults.auto_deactivate_threshold,
            )?,
            max_concurrent_conversations: parse_var(
                "PRESENCE_MAX_CONCURRENT",
                defaults.max_concurrent_conversations,
            )?,
            gap_min: secs_var("PRESENCE_GAP_MIN_SECS", defaults.gap_min)?,
            gap_max: secs_var("PRESENCE_GAP_MAX_SECS", defaults.gap_max)?,
            recent_cap: defaults.recent_cap,
            recent_ratio: defaults.recent_ratio,
            join_interval_min: secs_var("PRESENCE_JOIN_MIN_SECS", defaults.join_interval_min)?,
            join_interval_max: secs_var("PRESENCE_JOIN_MAX_SECS", defaults.join_interval_max)?,
            join_initial_delay: match env::var("PRESENCE_JOIN_INITIAL_DELAY_SECS") {
                Ok(raw) if raw.trim().eq_ignore_ascii_case("off") => None,
                Ok(raw) => Some(Duration::from_secs(parse_raw(
                    "PRESENCE_JOIN_INITIAL_DELAY_SECS",
                    &raw,
                )?)),
                Err(_) => defaults.join_initial_delay,
            },
            collaborator_timeout: secs_var(
                "PRESENCE_COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_concurrent_conversations == 0 {
            return Err(EngineError::Config(
                "max_concurrent_conversations must be at least 1".into(),
            ));
        }
        if self.collaborator_timeout.is_zero() {
            return Err(EngineError::Config(
                "collaborator_timeout must be greater than zero".into(),
            ));
        }
        if self.gap_min > self.gap_max {
            return Err(EngineError::Config(format!(
                "gap range is inverted ({:?} > {:?})",
                self.gap_min, self.gap_max
            )));
        }
        if self.join_interval_min > self.join_interval_max {
            return Err(EngineError::Config(format!(
                "join interval range is inverted ({:?} > {:?})",
                self.join_interval_min, self.join_interval_max
            )));
        }
        if !(0.0..=1.0).contains(&self.recent_ratio) {
            return Err(EngineError::Config(format!(
                "recent_ratio must be within 0..=1, got {}",
                self.recent_ratio
            )));
        }
        Ok(())
    }

    /// Size of the repeat-avoidance window for a catalog of `catalog_len`.
    pub fn repeat_window(&self, catalog_len: usize) -> usize {
        let by_ratio = (catalog_len as f64 * self.recent_ratio).floor() as usize;
        self.recent_cap.min(by_ratio)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> EngineResult<T> {
    match env::var(name) {
        Ok(raw) => parse_raw(name, &raw),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> EngineResult<Duration> {
    match env::var(name) {
        Ok(raw) => Ok(Duration::from_secs(parse_raw(name, &raw)?)),
        Err(_) => Ok(default),
    }
}

fn parse_raw<T: FromStr>(name: &str, raw: &str) -> EngineResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{name} must be a valid number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_repeat_window_uses_smaller_bound() {
        let config = EngineConfig::default();
        assert_eq!(config.repeat_window(10), 3);
        assert_eq!(config.repeat_window(100), 20);
        assert_eq!(config.repeat_window(3), 0);
    }

    #[test]
    fn test_inverted_gap_is_rejected() {
        let config = EngineConfig {
            gap_min: Duration::from_secs(90),
            gap_max: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_zero_collaborator_timeout_is_rejected() {
        let config = EngineConfig {
            collaborator_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = EngineConfig {
            max_concurrent_conversations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
