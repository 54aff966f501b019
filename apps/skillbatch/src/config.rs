use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::extraction::DEFAULT_TIMEOUT_SECS;
use crate::pipeline::gap_fill::{GapFillSettings, DEFAULT_MAX_ATTEMPTS};
use crate::pipeline::runner::RunnerSettings;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub extraction_url: String,
    pub extraction_timeout: Duration,
    pub batch_size: usize,
    pub request_delay: Duration,
    pub gap_fill_max_attempts: u32,
    pub gap_fill_backoff: Duration,
    pub auto_start: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            source_path: env_or("SOURCE_PATH", "merged_vacs.xlsx".to_string())?.into(),
            artifacts_dir: env_or("ARTIFACTS_DIR", "process_vacs".to_string())?.into(),
            extraction_url: require_env("EXTRACTION_URL")?,
            extraction_timeout: Duration::from_secs(env_or(
                "EXTRACTION_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            batch_size: env_or("BATCH_SIZE", 100)?,
            request_delay: Duration::from_millis(env_or("REQUEST_DELAY_MS", 100)?),
            gap_fill_max_attempts: env_or("GAP_FILL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            gap_fill_backoff: Duration::from_millis(env_or("GAP_FILL_BACKOFF_MS", 2000)?),
            auto_start: env_or("AUTO_START", true)?,
            port: env_or("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than zero");
        }
        if self.gap_fill_max_attempts == 0 {
            bail!("GAP_FILL_MAX_ATTEMPTS must be greater than zero");
        }
        Ok(())
    }

    /// Runner settings resuming from the artifacts on disk.
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            batch_size: self.batch_size,
            request_delay: self.request_delay,
            start_offset: None,
            max_batches: None,
        }
    }

    pub fn gap_fill_settings(&self) -> GapFillSettings {
        GapFillSettings {
            max_attempts: self.gap_fill_max_attempts,
            backoff: self.gap_fill_backoff,
            request_delay: self.request_delay,
            limit: None,
            retry_unresolved: false,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses `key` when set, otherwise returns `default`.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Invalid value '{raw}' for environment variable '{key}'"))
}
