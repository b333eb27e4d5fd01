//! Relay configuration.
//!
//! Every option is a command-line flag with an environment-variable
//! fallback: CLI wins, then the `THROTTLETALK_*` variable, then the
//! built-in default.

use std::time::Duration;
use thiserror::Error;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Soft cap on concurrent channels; exceeded channels are still created
    pub max_channels: usize,

    /// Hard cap on participants per channel; exceeded joins are refused
    pub max_participants_per_channel: usize,

    /// A participant is evicted once its last heartbeat is older than this
    pub heartbeat_timeout: Duration,

    /// Period of the stale-participant sweep
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            max_channels: 100,
            max_participants_per_channel: 40,
            heartbeat_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(3),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value for {option}: {value:?}")]
    InvalidValue { option: String, value: String },
}

impl ServerConfig {
    /// Resolves configuration from command-line arguments with env fallback.
    ///
    /// `args` is the argument list without the program name. `env` looks up
    /// an environment variable; injecting it keeps resolution testable
    /// without touching the process environment.
    pub fn resolve<A, E>(args: A, env: E) -> Result<Self, ConfigError>
    where
        A: IntoIterator<Item = String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut host = None;
        let mut port = None;
        let mut max_channels = None;
        let mut max_participants = None;
        let mut heartbeat_timeout = None;
        let mut heartbeat_interval = None;

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let slot = match flag.as_str() {
                "--host" => &mut host,
                "--port" => &mut port,
                "--max-channels" => &mut max_channels,
                "--max-participants" => &mut max_participants,
                "--heartbeat-timeout" => &mut heartbeat_timeout,
                "--heartbeat-interval" => &mut heartbeat_interval,
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            };
            match args.next() {
                Some(value) => *slot = Some(value),
                None => return Err(ConfigError::MissingValue(flag)),
            }
        }

        let defaults = Self::default();
        let pick = |cli: Option<String>, var: &str| cli.or_else(|| env(var));

        Ok(Self {
            host: pick(host, "THROTTLETALK_HOST").unwrap_or(defaults.host),
            port: parse_or(pick(port, "THROTTLETALK_PORT"), "--port", defaults.port)?,
            max_channels: parse_or(
                pick(max_channels, "THROTTLETALK_MAX_CHANNELS"),
                "--max-channels",
                defaults.max_channels,
            )?,
            max_participants_per_channel: parse_or(
                pick(max_participants, "THROTTLETALK_MAX_PARTICIPANTS"),
                "--max-participants",
                defaults.max_participants_per_channel,
            )?,
            heartbeat_timeout: parse_or(
                pick(heartbeat_timeout, "THROTTLETALK_HEARTBEAT_TIMEOUT"),
                "--heartbeat-timeout",
                defaults.heartbeat_timeout.as_secs(),
            )
            .and_then(|secs| positive_secs("--heartbeat-timeout", secs))?,
            heartbeat_interval: parse_or(
                pick(heartbeat_interval, "THROTTLETALK_HEARTBEAT_INTERVAL"),
                "--heartbeat-interval",
                defaults.heartbeat_interval.as_secs(),
            )
            .and_then(|secs| positive_secs("--heartbeat-interval", secs))?,
        })
    }
}

/// Heartbeat durations must be positive: the sweep timer requires a
/// non-zero period, and a zero timeout marks every participant stale.
fn positive_secs(option: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            option: option.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    option: &str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            option: option.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}
