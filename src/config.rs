//! Runtime configuration for the realtime core.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

/// Tunable settings for the connection session and the command port.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the REST command API, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Explicit websocket endpoint. Derived from `base_url` when unset.
    pub ws_url: Option<String>,
    /// Interval between keepalive probes while the socket is open.
    pub keepalive_interval: Duration,
    /// Interval of the status poll that re-derives the published
    /// connection state from the transport's raw status.
    pub status_poll_interval: Duration,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Abnormal closes tolerated before the session gives up for good.
    pub max_reconnect_attempts: u32,
    /// Upper bound on a single remote command round trip.
    pub command_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_owned(),
            ws_url: None,
            keepalive_interval: Duration::from_secs(30),
            status_poll_interval: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            command_timeout: Duration::from_secs(15),
        }
    }
}

impl Config {
    /// Build a config from `INBOX_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|value| value.parse::<u64>().ok())
                .map_or(default, Duration::from_secs)
        };

        Self {
            base_url: lookup("INBOX_BASE_URL").unwrap_or(defaults.base_url),
            ws_url: lookup("INBOX_WS_URL"),
            keepalive_interval: secs("INBOX_KEEPALIVE_SECS", defaults.keepalive_interval),
            status_poll_interval: secs("INBOX_STATUS_POLL_SECS", defaults.status_poll_interval),
            reconnect_delay: secs("INBOX_RECONNECT_DELAY_SECS", defaults.reconnect_delay),
            max_reconnect_attempts: lookup("INBOX_MAX_RECONNECT_ATTEMPTS")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.max_reconnect_attempts),
            command_timeout: secs("INBOX_COMMAND_TIMEOUT_SECS", defaults.command_timeout),
        }
    }
}
