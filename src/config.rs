use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub admin_api_key: String,
    pub idempotency_capacity: usize,
    pub idempotency_ttl_secs: u64,
    pub ledger_max_attempts: u32,
    pub ledger_retry_base_ms: u64,
    pub ledger_commit_timeout_ms: u64,
    pub reconcile_interval_secs: u64,
    pub donation_idempotency: bool,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            server_port: parse_var("SERVER_PORT", 3000)?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            admin_api_key: env::var("ADMIN_API_KEY").context("ADMIN_API_KEY must be set")?,
            idempotency_capacity: parse_var("IDEMPOTENCY_CAPACITY", 1000)?,
            idempotency_ttl_secs: parse_var("IDEMPOTENCY_TTL_SECS", 86_400)?,
            ledger_max_attempts: parse_var("LEDGER_MAX_ATTEMPTS", 3)?,
            ledger_retry_base_ms: parse_var("LEDGER_RETRY_BASE_MS", 50)?,
            ledger_commit_timeout_ms: parse_var("LEDGER_COMMIT_TIMEOUT_MS", 5000)?,
            reconcile_interval_secs: parse_var("RECONCILE_INTERVAL_SECS", 300)?,
            donation_idempotency: parse_var("DONATION_IDEMPOTENCY", false)?,
            log_format: parse_var("LOG_FORMAT", LogFormat::Text)?,
            log_request_body: parse_var("LOG_REQUEST_BODY", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.admin_api_key.len() < 16 {
            anyhow::bail!("ADMIN_API_KEY must be at least 16 characters");
        }
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.idempotency_capacity == 0 {
            anyhow::bail!("IDEMPOTENCY_CAPACITY must be greater than 0");
        }
        if self.ledger_max_attempts == 0 {
            anyhow::bail!("LEDGER_MAX_ATTEMPTS must be greater than 0");
        }
        if self.ledger_commit_timeout_ms == 0 {
            anyhow::bail!("LEDGER_COMMIT_TIMEOUT_MS must be greater than 0");
        }
        Ok(())
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_commit_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.ledger_retry_base_ms)
    }

    /// `None` disables the background reconciliation sweep.
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        _ => Ok(default),
    }
}
