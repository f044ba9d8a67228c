//! Server configuration.
//!
//! Everything is read from `KIOSK_*` environment variables by [`ServerConfig::from_env_or_default`]. Invalid values are
//! logged and replaced by their defaults, so a typo never stops the kiosk from taking payments.
use std::{env, fmt::Display, str::FromStr};

use cash_ledger::DEFAULT_MAX_PRINT_ATTEMPTS;
use chrono::Duration;
use kiosk_common::{helpers::env_parse, Secret};
use log::*;

const DEFAULT_KIOSK_HOST: &str = "127.0.0.1";
const DEFAULT_KIOSK_PORT: u16 = 8360;
const DEFAULT_SESSION_RETENTION_MINS: i64 = 30;
const DEFAULT_PRINT_JOB_TIMEOUT_SECS: i64 = 120;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret the edge sends in the `X-API-Key` header. `None` disables the check.
    pub api_key: Option<Secret<String>>,
    /// How long completed and cancelled sessions stay queryable before they are evicted.
    pub session_retention: Duration,
    /// A dispatched print job that has not been acknowledged within this time is queued again.
    pub print_job_timeout: Duration,
    /// Number of dispatches after which a failing print job is marked as failed for good.
    pub print_max_attempts: u32,
    /// How often the maintenance worker runs.
    pub sweep_interval: std::time::Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_KIOSK_HOST.to_string(),
            port: DEFAULT_KIOSK_PORT,
            api_key: None,
            session_retention: Duration::minutes(DEFAULT_SESSION_RETENTION_MINS),
            print_job_timeout: Duration::seconds(DEFAULT_PRINT_JOB_TIMEOUT_SECS),
            print_max_attempts: DEFAULT_MAX_PRINT_ATTEMPTS,
            sweep_interval: std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("KIOSK_HOST").ok().unwrap_or_else(|| DEFAULT_KIOSK_HOST.into());
        let port = env_or("KIOSK_PORT", DEFAULT_KIOSK_PORT);
        let api_key = match env::var("KIOSK_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(Secret::new(key.trim().to_string())),
            _ => {
                warn!(
                    "🚨️🚨️🚨️ KIOSK_API_KEY is not set. Anyone who can reach this server can report cash and read \
                     receipts. DO NOT run a production kiosk like this. 🚨️🚨️🚨️"
                );
                None
            },
        };
        let session_retention =
            Duration::minutes(env_or("KIOSK_SESSION_RETENTION_MINS", DEFAULT_SESSION_RETENTION_MINS).max(0));
        let print_job_timeout =
            Duration::seconds(env_or("KIOSK_PRINT_JOB_TIMEOUT_SECS", DEFAULT_PRINT_JOB_TIMEOUT_SECS).max(1));
        let print_max_attempts = env_or("KIOSK_PRINT_MAX_ATTEMPTS", DEFAULT_MAX_PRINT_ATTEMPTS).max(1);
        let sweep_interval =
            std::time::Duration::from_secs(env_or("KIOSK_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1));
        Self { host, port, api_key, session_retention, print_job_timeout, print_max_attempts, sweep_interval }
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env_parse::<T>(name) {
        Ok(Some(v)) => v,
        Ok(None) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Err((raw, e)) => {
            error!("🪛️ {raw} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        },
    }
}
