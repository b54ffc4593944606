//! Runtime settings, read from the environment.
//!
//! Every setting has a default, so an empty environment gives a working
//! local setup. A value that is set but unusable is an error rather than a
//! silent fallback.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

use crate::constants::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RECONNECT_INTERVAL,
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://ballots.db";
pub const DEFAULT_NSQD_ADDR: &str = "127.0.0.1:4150";
pub const DEFAULT_VOTE_STREAM_ADDR: &str = "127.0.0.1:7070";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} must not be zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `DATABASE_URL`
    pub database_url: String,
    /// `NSQD_ADDR`
    pub nsqd_addr: String,
    /// `VOTE_STREAM_ADDR`
    pub vote_stream_addr: String,
    /// `FLUSH_INTERVAL_MS`
    pub flush_interval: Duration,
    /// `RECONNECT_INTERVAL_MS`
    pub reconnect_interval: Duration,
    /// `QUEUE_CAPACITY`
    pub queue_capacity: usize,
    /// `MAX_IN_FLIGHT`
    pub max_in_flight: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            nsqd_addr: DEFAULT_NSQD_ADDR.to_owned(),
            vote_stream_addr: DEFAULT_VOTE_STREAM_ADDR.to_owned(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from `lookup`, which returns the value of a variable
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            database_url: try_load(&lookup, "DATABASE_URL", defaults.database_url)?,
            nsqd_addr: try_load(&lookup, "NSQD_ADDR", defaults.nsqd_addr)?,
            vote_stream_addr: try_load(&lookup, "VOTE_STREAM_ADDR", defaults.vote_stream_addr)?,
            flush_interval: try_load_millis(&lookup, "FLUSH_INTERVAL_MS", defaults.flush_interval)?,
            reconnect_interval: try_load_millis(
                &lookup,
                "RECONNECT_INTERVAL_MS",
                defaults.reconnect_interval,
            )?,
            queue_capacity: non_zero(
                "QUEUE_CAPACITY",
                try_load(&lookup, "QUEUE_CAPACITY", defaults.queue_capacity)?,
            )?,
            max_in_flight: non_zero(
                "MAX_IN_FLIGHT",
                try_load(&lookup, "MAX_IN_FLIGHT", defaults.max_in_flight)?,
            )?,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn try_load_millis<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = try_load(lookup, key, default.as_millis() as u64)?;
    non_zero(key, millis).map(Duration::from_millis)
}

fn non_zero<T: Default + PartialEq>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}
