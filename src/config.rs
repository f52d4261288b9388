use std::env;

use crate::error::AppError;

/// Timing and matching knobs used by the ride engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RideSettings {
    pub request_ttl_secs: i64,
    pub offer_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub driver_avg_speed_kmh: f64,
}

impl Default for RideSettings {
    fn default() -> Self {
        Self {
            request_ttl_secs: 60,
            offer_ttl_secs: 20,
            sweep_interval_secs: 10,
            driver_avg_speed_kmh: 35.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}, expected compact/json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub seed_demo_data: bool,
    pub ride: RideSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RideSettings::default();

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_or_default(&lookup, "LOG_FORMAT", LogFormat::Compact)?,
            event_buffer_size: parse_or_default(&lookup, "EVENT_BUFFER_SIZE", 1024)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_or_default(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            seed_demo_data: parse_or_default(&lookup, "SEED_DEMO_DATA", false)?,
            ride: RideSettings {
                request_ttl_secs: parse_or_default(&lookup, "REQUEST_TTL_SECS", defaults.request_ttl_secs)?,
                offer_ttl_secs: parse_or_default(&lookup, "OFFER_TTL_SECS", defaults.offer_ttl_secs)?,
                sweep_interval_secs: parse_or_default(
                    &lookup,
                    "SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval_secs,
                )?,
                driver_avg_speed_kmh: parse_or_default(
                    &lookup,
                    "RIDE_DRIVER_AVG_SPEED_KMH",
                    defaults.driver_avg_speed_kmh,
                )?,
            },
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert!(config.database_url.is_none());
        assert_eq!(config.ride, RideSettings::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("OFFER_TTL_SECS", "45"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/rides"),
        ]))
        .unwrap();
        assert_eq!(config.ride.offer_ttl_secs, 45);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/rides"));
    }

    #[test]
    fn bad_value_names_the_key() {
        let err = Config::from_lookup(lookup(&[("HTTP_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("HTTP_PORT"));
    }
}
