use std::str::FromStr;
use std::time::Duration;

use parl_adapters::{DEFAULT_BILLS_URL, DEFAULT_MPS_URL};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set (legacy name DBcon is also accepted)")]
    MissingDatabaseUrl,
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// What a scheduler tick does when the previous cycle is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Start the new cycle alongside the running one.
    Concurrent,
    /// Log and skip the tick.
    SkipIfRunning,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(OverlapPolicy::Concurrent),
            "skip" | "skip-if-running" => Ok(OverlapPolicy::SkipIfRunning),
            other => Err(format!("expected `concurrent` or `skip`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bills_url: String,
    pub mps_url: String,
    pub sync_interval: Duration,
    pub overlap: OverlapPolicy,
    pub http_timeout: Option<Duration>,
    pub stream_timeout: Option<Duration>,
    /// How long shutdown waits for in-flight cycles before aborting them.
    pub shutdown_grace: Duration,
    pub user_agent: String,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .or_else(|| get("DBcon"))
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let interval_secs: u64 = parse_var(&get, "PARL_SYNC_INTERVAL_SECS", 3600)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "PARL_SYNC_INTERVAL_SECS",
                value: "0".into(),
                reason: "interval must be positive".into(),
            });
        }

        Ok(Self {
            database_url,
            db_max_connections: parse_var(&get, "PARL_DB_MAX_CONNECTIONS", 25)?,
            bills_url: get("PARL_BILLS_URL").unwrap_or_else(|| DEFAULT_BILLS_URL.to_string()),
            mps_url: get("PARL_MPS_URL").unwrap_or_else(|| DEFAULT_MPS_URL.to_string()),
            sync_interval: Duration::from_secs(interval_secs),
            overlap: parse_var(&get, "PARL_SYNC_OVERLAP", OverlapPolicy::Concurrent)?,
            http_timeout: optional_secs(parse_var(&get, "PARL_HTTP_TIMEOUT_SECS", 30)?),
            stream_timeout: optional_secs(parse_var(&get, "PARL_STREAM_TIMEOUT_SECS", 0)?),
            shutdown_grace: Duration::from_secs(parse_var(&get, "PARL_SHUTDOWN_GRACE_SECS", 30)?),
            user_agent: get("PARL_USER_AGENT").unwrap_or_else(|| "parlwatch/0.1".to_string()),
        })
    }
}

/// Parse `var` when present; an unparsable value is an error, never a
/// silent fallback to `default`.
pub fn parse_var<F, T>(get: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            var,
            reason: err.to_string(),
            value,
        }),
    }
}

// 0 disables the deadline.
fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
