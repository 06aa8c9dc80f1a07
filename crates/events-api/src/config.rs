// Server configuration loaded from environment variables.
// Decision: EVENTS_ prefix for all service settings; DATABASE_URL overrides the EVENTS_DB_* parts
// Decision: Unparseable values abort startup instead of silently falling back to defaults

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use events_core::{DispatcherConfig, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_LEASE_DURATION};
use events_storage::DatabaseUrl;

/// Event store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// PostgreSQL (production)
    #[default]
    Postgres,
    /// Process memory (local development, events are lost on restart)
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => bail!("unknown storage backend: {other} (expected postgres or memory)"),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub addr: SocketAddr,
    pub storage: StorageBackend,
    /// Connection string, only used with the postgres backend
    pub database_url: String,
    pub dispatcher: DispatcherConfig,
    /// Bound on a single delivery call
    pub delivery_timeout: Duration,
    /// How long a dispatch claim holds an event
    pub lease_duration: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let addr = match var("EVENTS_ADDR") {
            Some(addr) => addr
                .trim()
                .parse()
                .with_context(|| format!("EVENTS_ADDR is not a socket address: {addr}"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 9090)),
        };

        let storage = match var("EVENTS_STORAGE") {
            Some(storage) => storage.parse().context("Invalid EVENTS_STORAGE")?,
            None => StorageBackend::default(),
        };

        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => DatabaseUrl::from_lookup(&lookup)
                .and_then(|url| url.connection_string())
                .context("Invalid EVENTS_DB_* settings")?,
        };

        let defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig::new()
            .with_poll_interval(
                parse_var(&var, "EVENTS_POLL_INTERVAL_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.poll_interval),
            )
            .with_max_concurrency(
                parse_var(&var, "EVENTS_DISPATCH_CONCURRENCY")?.unwrap_or(defaults.max_concurrency),
            )
            .with_shutdown_timeout(
                parse_var(&var, "EVENTS_SHUTDOWN_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.shutdown_timeout),
            );

        let delivery_timeout = parse_var(&var, "EVENTS_DELIVERY_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DELIVERY_TIMEOUT);
        if delivery_timeout.is_zero() {
            bail!("EVENTS_DELIVERY_TIMEOUT_MS must be greater than zero");
        }

        let lease_duration = parse_var(&var, "EVENTS_LEASE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LEASE_DURATION);

        Ok(Self {
            addr,
            storage,
            database_url,
            dispatcher,
            delivery_timeout,
            lease_duration,
        })
    }
}

fn parse_var<T, V>(var: &V, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("{key} has an invalid value: {value}"))
        })
        .transpose()
}
