//! Config for the broker
//!
//! Configuration can be created programmatically using [`BrokerConfig::new()`] or by reading
//! environment variables using [`BrokerConfig::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Flags are case-insensitive: set the value to `"true"` to enable one.
//! Numeric values that do not parse are ignored.
//!
//! - `RPS_PORT`: TCP port to listen on, `0` for any free port (default: `0`)
//! - `RPS_REQUEST_CAPACITY`: Capacity of the request channel (default: `1000`)
//! - `RPS_RESULT_CAPACITY`: Capacity of the result ledger (default: `1000`)
//! - `RPS_LOG`: Enable logging to a file (default: `false`)
//! - `RPS_SUMMARY_ON_HANGUP`: Print the summary on `SIGHUP` (default: `true`)

use std::str::FromStr;

/// Capacity used for both channels unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Configuration for the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    pub(crate) port: u16,
    pub(crate) request_capacity: usize,
    pub(crate) result_capacity: usize,
    pub(crate) log: bool,
    pub(crate) summary_on_hangup: bool,
}

impl BrokerConfig {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The broker listens on a port chosen by the system.
    /// - Both channels hold up to [`DEFAULT_CAPACITY`] elements.
    /// - Logging to file is disabled.
    /// - `SIGHUP` prints the summary.
    pub fn new() -> Self {
        Self {
            port: 0,
            request_capacity: DEFAULT_CAPACITY,
            result_capacity: DEFAULT_CAPACITY,
            log: false,
            summary_on_hangup: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the [module documentation](crate::configuration) for the recognized variables. Any
    /// unset or unparsable variable keeps its default value.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get_env_flag = |var: &str, default: bool| match lookup(var) {
            Some(val) => val.eq_ignore_ascii_case("true"),
            None => default,
        };

        let defaults = Self::new();
        Self {
            port: get_parsed(lookup("RPS_PORT"), defaults.port),
            request_capacity: get_parsed(
                lookup("RPS_REQUEST_CAPACITY"),
                defaults.request_capacity,
            ),
            result_capacity: get_parsed(lookup("RPS_RESULT_CAPACITY"), defaults.result_capacity),
            log: get_env_flag("RPS_LOG", defaults.log),
            summary_on_hangup: get_env_flag(
                "RPS_SUMMARY_ON_HANGUP",
                defaults.summary_on_hangup,
            ),
        }
    }

    /// Set the listening port (`0` lets the system pick one).
    pub fn with_port(mut self, value: u16) -> Self {
        self.port = value;
        self
    }

    /// Set the capacity of the request channel.
    ///
    /// Requests arriving while it is full are dropped and their connection is closed.
    pub fn with_request_capacity(mut self, value: usize) -> Self {
        self.request_capacity = value;
        self
    }

    /// Set the capacity of the result ledger.
    ///
    /// Once it is full, further results are dropped.
    pub fn with_result_capacity(mut self, value: usize) -> Self {
        self.result_capacity = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable printing the summary on `SIGHUP`.
    ///
    /// Has no effect on platforms without signals.
    pub fn with_summary_on_hangup(mut self, value: bool) -> Self {
        self.summary_on_hangup = value;
        self
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether logging to file is enabled.
    pub fn log(&self) -> bool {
        self.log
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn get_parsed<T: FromStr + Copy>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
