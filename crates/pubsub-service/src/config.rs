//! Service configuration from environment variables.

use std::env;
use std::time::Duration;

use subpub::{BusConfig, OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
use tracing::warn;

use crate::errors::ConfigError;

/// Default port for the embedding transport.
pub const DEFAULT_GRPC_PORT: u16 = 50051;

/// Default deadline for draining subscribers on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5000);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or `target=level` list)
    pub level: String,

    /// Emit JSON formatted logs
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration for the pub/sub service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Port for the transport of an embedding binary.
    ///
    /// Carried through for the binary that hosts a gRPC server around
    /// [`PubSubService`](crate::PubSubService); nothing in this crate binds it.
    pub grpc_port: u16,

    /// Deadline passed to the bus on shutdown
    pub shutdown_timeout: Duration,

    /// Per-subscriber queue capacity
    pub queue_capacity: usize,

    /// What the bus does with a full subscriber queue
    pub overflow_policy: OverflowPolicy,

    pub log: LogConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            grpc_port: DEFAULT_GRPC_PORT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// An invalid variable is logged and replaced by its default; the other
    /// variables are still honored.
    ///
    /// # Environment Variables
    ///
    /// - `GRPC_PORT`: Transport port (default: 50051)
    /// - `PUBSUB_SHUTDOWN_TIMEOUT_MS`: Shutdown deadline in ms (default: 5000)
    /// - `PUBSUB_QUEUE_CAPACITY`: Per-subscriber queue capacity (default: 128)
    /// - `PUBSUB_OVERFLOW_POLICY`: `handoff` or `drop-newest` (default: handoff)
    /// - `PUBSUB_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `PUBSUB_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup_lenient(|key| env::var(key).ok())
    }

    /// Create configuration from environment variables, rejecting invalid
    /// values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for the first variable that fails to parse.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source, rejecting
    /// invalid values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for the first variable that fails to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, mut errors) = Self::load(lookup);
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Create configuration from an arbitrary variable source, falling back
    /// to the default of each variable that fails to parse.
    pub fn from_lookup_lenient<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, errors) = Self::load(lookup);
        for err in &errors {
            warn!(error = %err, "Invalid service configuration value; using default");
        }
        config
    }

    /// Parse every variable, keeping the default for each invalid one.
    fn load<F>(lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut errors = Vec::new();

        let grpc_port = lookup("GRPC_PORT")
            .filter(|v| !v.is_empty())
            .map(|value| parse_number::<u16>("GRPC_PORT", value))
            .transpose()
            .unwrap_or_else(|err| {
                errors.push(err);
                None
            })
            .unwrap_or(defaults.grpc_port);

        let shutdown_timeout = lookup("PUBSUB_SHUTDOWN_TIMEOUT_MS")
            .map(|value| parse_number::<u64>("PUBSUB_SHUTDOWN_TIMEOUT_MS", value))
            .transpose()
            .unwrap_or_else(|err| {
                errors.push(err);
                None
            })
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_timeout);

        let queue_capacity = lookup("PUBSUB_QUEUE_CAPACITY")
            .map(parse_capacity)
            .transpose()
            .unwrap_or_else(|err| {
                errors.push(err);
                None
            })
            .unwrap_or(defaults.queue_capacity);

        let overflow_policy = lookup("PUBSUB_OVERFLOW_POLICY")
            .map(|value| {
                let parsed = value.parse::<OverflowPolicy>();
                parsed.map_err(|err| ConfigError::Invalid {
                    key: "PUBSUB_OVERFLOW_POLICY",
                    reason: err.to_string(),
                    value,
                })
            })
            .transpose()
            .unwrap_or_else(|err| {
                errors.push(err);
                None
            })
            .unwrap_or(defaults.overflow_policy);

        let log = LogConfig {
            level: lookup("PUBSUB_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log.level),
            json: lookup("PUBSUB_JSON_LOGS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.log.json),
        };

        let config = Self {
            grpc_port,
            shutdown_timeout,
            queue_capacity,
            overflow_policy,
            log,
        };
        (config, errors)
    }

    /// Bus settings derived from this configuration.
    pub fn bus_config(&self) -> BusConfig {
        BusConfig::default()
            .with_queue_capacity(self.queue_capacity)
            .with_overflow_policy(self.overflow_policy)
    }
}

fn parse_capacity(value: String) -> Result<usize, ConfigError> {
    let capacity: usize = parse_number("PUBSUB_QUEUE_CAPACITY", value.clone())?;
    if capacity == 0 {
        return Err(ConfigError::Invalid {
            key: "PUBSUB_QUEUE_CAPACITY",
            value,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(capacity)
}

fn parse_number<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
        value,
    })
}
