use std::env;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub matching: MatchingConfig,
}

/// Tunables for the shared-ride matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub max_matching_secs: u64,
    pub proximity_radius_km: f64,
    pub time_window_secs: u64,
    pub max_passengers: u32,
    pub matching_interval_ms: u64,
    pub audit_log_capacity: usize,
    /// Finished requests and matches kept for status lookups.
    pub outcome_retention: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_matching_secs: 180,
            proximity_radius_km: 2.0,
            time_window_secs: 30 * 60,
            max_passengers: 4,
            matching_interval_ms: 5_000,
            audit_log_capacity: 1_000,
            outcome_retention: 10_000,
        }
    }
}

impl MatchingConfig {
    pub fn max_matching_duration(&self) -> Duration {
        Duration::seconds(self.max_matching_secs as i64)
    }

    pub fn time_window(&self) -> Duration {
        Duration::seconds(self.time_window_secs as i64)
    }

    pub fn tick_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.matching_interval_ms.max(1))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = MatchingConfig::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            matching: MatchingConfig {
                max_matching_secs: parse_or_default(
                    "MAX_MATCHING_SECS",
                    defaults.max_matching_secs,
                )?,
                proximity_radius_km: parse_or_default(
                    "PROXIMITY_RADIUS_KM",
                    defaults.proximity_radius_km,
                )?,
                time_window_secs: parse_or_default("TIME_WINDOW_SECS", defaults.time_window_secs)?,
                max_passengers: parse_or_default("MAX_PASSENGERS", defaults.max_passengers)?,
                matching_interval_ms: parse_or_default(
                    "MATCHING_INTERVAL_MS",
                    defaults.matching_interval_ms,
                )?,
                audit_log_capacity: parse_or_default(
                    "AUDIT_LOG_CAPACITY",
                    defaults.audit_log_capacity,
                )?,
                outcome_retention: parse_or_default(
                    "OUTCOME_RETENTION",
                    defaults.outcome_retention,
                )?,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::MatchingConfig;

    #[test]
    fn defaults_match_service_contract() {
        let config = MatchingConfig::default();

        assert_eq!(config.max_matching_duration().num_seconds(), 180);
        assert_eq!(config.time_window().num_minutes(), 30);
        assert_eq!(config.max_passengers, 4);
        assert_eq!(config.tick_interval().as_secs(), 5);
        assert_eq!(config.audit_log_capacity, 1000);
        assert_eq!(config.outcome_retention, 10_000);
        assert!((config.proximity_radius_km - 2.0).abs() < f64::EPSILON);
    }
}
