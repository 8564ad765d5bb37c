use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use murmur_jobs::QueueSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub queue_db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// When unset, events are published to the in-process hub only.
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub workers: usize,
    pub queue: QueueSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = QueueSettings::default();

        let queue = QueueSettings {
            max_attempts: parse_or(&lookup, "MURMUR_JOB_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff_secs: parse_or(&lookup, "MURMUR_JOB_BASE_BACKOFF_SECS", defaults.base_backoff_secs)?,
            max_backoff_secs: parse_or(&lookup, "MURMUR_JOB_MAX_BACKOFF_SECS", defaults.max_backoff_secs)?,
            lease: Duration::from_secs(parse_or(&lookup, "MURMUR_JOB_LEASE_SECS", defaults.lease.as_secs())?),
            ..defaults
        };

        Ok(Self {
            db_path: lookup("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()).into(),
            queue_db_path: lookup("MURMUR_QUEUE_DB_PATH")
                .unwrap_or_else(|| "murmur-jobs.db".into())
                .into(),
            host: lookup("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "MURMUR_PORT", 3000)?,
            redis_url: lookup("MURMUR_REDIS_URL").filter(|url| !url.trim().is_empty()),
            redis_prefix: lookup("MURMUR_REDIS_PREFIX").unwrap_or_default(),
            workers: parse_or(&lookup, "MURMUR_WORKERS", 4)?,
            queue,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
