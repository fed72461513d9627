//! Sync Configuration Settings
//!
//! Configuration types for the dashboard sync core, loaded from environment
//! variables. Unset or unparsable numeric values fall back to their
//! defaults; malformed URLs are rejected.

use std::time::Duration;

/// Default streaming base URL.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Streaming base URL (`ws://` or `wss://`). Channel paths are appended.
    pub ws_url: String,
    /// REST base URL (`http://` or `https://`).
    pub api_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Interval between application-level pings.
    pub keepalive_interval: Duration,
    /// Silence after a ping before the connection is dropped (`None` = never).
    pub pong_timeout: Option<Duration>,
    /// Delay before a reconnect attempt.
    pub reconnect_interval: Duration,
    /// Upper bound on the reconnect delay when a multiplier is set.
    pub reconnect_delay_max: Duration,
    /// Reconnect delay multiplier (1.0 = fixed interval).
    pub reconnect_multiplier: f64,
    /// Reconnect attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Reconnect automatically after a close.
    pub auto_reconnect: bool,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: None,
            reconnect_interval: Duration::from_millis(3_000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_multiplier: 1.0,
            max_reconnect_attempts: 5,
            auto_reconnect: true,
        }
    }
}

/// Consumer feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Debounce window for batched and accumulated delivery.
    pub batch_interval: Duration,
    /// Visible activity entries.
    pub activity_capacity: usize,
    /// Maximum open positions kept.
    pub positions_capacity: usize,
    /// REST refresh cadence while the stream is down (`None` = off).
    pub fallback_refresh: Option<Duration>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_millis(100),
            activity_capacity: 50,
            positions_capacity: 500,
            fallback_refresh: Some(Duration::from_secs(30)),
        }
    }
}

/// Job polling settings.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Wait between status fetches.
    pub interval: Duration,
    /// Status fetches before giving up.
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

/// Complete sync configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Service endpoints.
    pub endpoints: Endpoints,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Consumer feed settings.
    pub feeds: FeedSettings,
    /// Job polling settings.
    pub poll: PollSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl SyncConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is empty or has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is empty or has the wrong scheme.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let endpoints = Endpoints {
            ws_url: env.url("DASHBOARD_WS_URL", DEFAULT_WS_URL, &["ws://", "wss://"])?,
            api_url: env.url("DASHBOARD_API_URL", DEFAULT_API_URL, &["http://", "https://"])?,
        };

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            keepalive_interval: env.secs("DASHBOARD_KEEPALIVE_INTERVAL_SECS", defaults.keepalive_interval),
            pong_timeout: env.optional_secs("DASHBOARD_PONG_TIMEOUT_SECS", defaults.pong_timeout),
            reconnect_interval: env.millis("DASHBOARD_RECONNECT_INTERVAL_MS", defaults.reconnect_interval),
            reconnect_delay_max: env.secs("DASHBOARD_RECONNECT_DELAY_MAX_SECS", defaults.reconnect_delay_max),
            reconnect_multiplier: env.parse("DASHBOARD_RECONNECT_MULTIPLIER", defaults.reconnect_multiplier),
            max_reconnect_attempts: env.parse("DASHBOARD_MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts),
            auto_reconnect: env.flag("DASHBOARD_AUTO_RECONNECT", defaults.auto_reconnect),
        };

        let defaults = FeedSettings::default();
        let feeds = FeedSettings {
            batch_interval: env.millis("DASHBOARD_BATCH_INTERVAL_MS", defaults.batch_interval),
            activity_capacity: env.parse("DASHBOARD_ACTIVITY_CAPACITY", defaults.activity_capacity),
            positions_capacity: env.parse("DASHBOARD_POSITIONS_CAPACITY", defaults.positions_capacity),
            fallback_refresh: env.optional_secs("DASHBOARD_FALLBACK_REFRESH_SECS", defaults.fallback_refresh),
        };

        let defaults = PollSettings::default();
        let poll = PollSettings {
            interval: env.secs("DASHBOARD_POLL_INTERVAL_SECS", defaults.interval),
            max_attempts: env.parse("DASHBOARD_POLL_MAX_ATTEMPTS", defaults.max_attempts),
        };

        let server = ServerSettings {
            metrics_port: env.parse("DASHBOARD_METRICS_PORT", 0),
        };

        Ok(Self {
            endpoints,
            websocket,
            feeds,
            poll,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} has invalid value {value:?}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |v| {
            !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off")
        })
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    /// Zero disables the setting.
    fn optional_secs(&self, key: &str, default: Option<Duration>) -> Option<Duration> {
        match self.get(key).and_then(|v| v.parse::<u64>().ok()) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default,
        }
    }

    fn url(&self, key: &str, default: &str, schemes: &[&str]) -> Result<String, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default.to_string());
        };
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        let lower = value.to_lowercase();
        let Some(scheme) = schemes.iter().find(|scheme| lower.starts_with(**scheme)) else {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                reason: format!("expected one of {}", schemes.join(", ")),
            });
        };
        if value.len() == scheme.len() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                reason: "missing host".to_string(),
            });
        }
        Ok(value.trim_end_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<SyncConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();

        assert_eq!(config.endpoints, Endpoints::default());
        assert_eq!(config.websocket.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.websocket.reconnect_interval, Duration::from_millis(3_000));
        assert_eq!(config.websocket.max_reconnect_attempts, 5);
        assert!(config.websocket.auto_reconnect);
        assert!(config.websocket.pong_timeout.is_none());
        assert_eq!(config.feeds.batch_interval, Duration::from_millis(100));
        assert_eq!(config.feeds.activity_capacity, 50);
        assert_eq!(config.feeds.fallback_refresh, Some(Duration::from_secs(30)));
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert_eq!(config.poll.max_attempts, 60);
        assert_eq!(config.server.metrics_port, 0);
    }

    #[test]
    fn overrides_from_environment() {
        let config = config(&[
            ("DASHBOARD_WS_URL", "wss://bot.example.com/"),
            ("DASHBOARD_MAX_RECONNECT_ATTEMPTS", "0"),
            ("DASHBOARD_AUTO_RECONNECT", "false"),
            ("DASHBOARD_FALLBACK_REFRESH_SECS", "0"),
            ("DASHBOARD_PONG_TIMEOUT_SECS", "45"),
            ("DASHBOARD_BATCH_INTERVAL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.endpoints.ws_url, "wss://bot.example.com");
        assert_eq!(config.websocket.max_reconnect_attempts, 0);
        assert!(!config.websocket.auto_reconnect);
        assert!(config.feeds.fallback_refresh.is_none());
        assert_eq!(config.websocket.pong_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.feeds.batch_interval, Duration::from_millis(250));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[("DASHBOARD_POLL_MAX_ATTEMPTS", "lots")]).unwrap();
        assert_eq!(config.poll.max_attempts, 60);
    }

    #[test]
    fn rejects_wrong_scheme() {
        let err = config(&[("DASHBOARD_WS_URL", "http://localhost:8000")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DASHBOARD_WS_URL"));

        let err = config(&[("DASHBOARD_API_URL", "ws://localhost:8000")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_empty_and_hostless_urls() {
        assert!(matches!(
            config(&[("DASHBOARD_API_URL", "  ")]).unwrap_err(),
            ConfigError::EmptyValue(_)
        ));
        assert!(matches!(
            config(&[("DASHBOARD_WS_URL", "ws://")]).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }
}
