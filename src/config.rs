use std::env;
use std::str::FromStr;

use crate::engine::pricing::FareSchedule;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}`, expected compact or json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub subscriber_buffer_size: usize,
    pub fare: FareSchedule,
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
        let subscriber_buffer_size = parse_or_default(&lookup, "SUBSCRIBER_BUFFER_SIZE", 256)?;
        if subscriber_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid SUBSCRIBER_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_or_default(&lookup, "LOG_FORMAT", LogFormat::Compact)?,
            subscriber_buffer_size,
            fare: FareSchedule {
                base: parse_or_default(&lookup, "FARE_BASE", 3.0)?,
                per_km: parse_or_default(&lookup, "FARE_PER_KM", 1.5)?,
            },
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}
