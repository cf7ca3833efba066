//! # Pipeline configuration.
//!
//! [`Config`] centralizes every knob of the pipeline. It is a plain structured
//! value: build it in code (all fields are public, [`Default`] is sensible) or
//! load it from YAML with [`Config::from_yaml_str`]. Durations are written in
//! milliseconds (`*_ms` keys).
//!
//! ```yaml
//! polling:
//!   interval_ms: 60000
//!   max_interval_ms: 600000
//!   workers: 20
//! delivery:
//!   max_retries: 5
//!   endpoint:
//!     base_url: https://ingest.example.com
//!     namespace: kyma
//!     data_stream: consumption-metrics
//!     version: v1
//!     env: prod
//!     token: secret
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, JitterPolicy};

fn millis<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

/// Root configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Supervisor and event bus settings.
    pub supervisor: SupervisorConfig,
    /// Fleet-change watcher settings.
    pub watcher: WatcherConfig,
    /// Polling engine settings (shared by every provider engine).
    pub polling: PollingConfig,
    /// Event delivery settings.
    pub delivery: DeliveryConfig,
    /// Logger settings.
    pub logging: LogConfig,
}

impl Config {
    /// Parses a YAML document; missing sections and keys take their defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.polling.workers == 0 {
            return invalid("polling.workers", "must be at least 1");
        }
        if self.delivery.workers == 0 {
            return invalid("delivery.workers", "must be at least 1");
        }
        if self.polling.interval.is_zero() {
            return invalid("polling.interval_ms", "must be positive");
        }
        if self.polling.max_interval < self.polling.interval {
            return invalid("polling.max_interval_ms", "must not be below polling.interval_ms");
        }
        if self.delivery.retry_max < self.delivery.retry_base {
            return invalid("delivery.retry_max_ms", "must not be below delivery.retry_base_ms");
        }

        let ep = &self.delivery.endpoint;
        for (field, value) in [
            ("delivery.endpoint.base_url", &ep.base_url),
            ("delivery.endpoint.namespace", &ep.namespace),
            ("delivery.endpoint.data_stream", &ep.data_stream),
            ("delivery.endpoint.version", &ep.version),
            ("delivery.endpoint.env", &ep.env),
        ] {
            if value.trim().is_empty() {
                return invalid(field, "must not be empty");
            }
        }
        Ok(())
    }
}

/// Supervisor settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// How long to wait for the remaining loops once the first one returned.
    #[serde(rename = "grace_ms", deserialize_with = "millis")]
    pub grace: Duration,
    /// Capacity of the runtime event bus ring buffer (min 1).
    pub bus_capacity: usize,
    /// Stop the pipeline on SIGINT/SIGTERM/SIGQUIT.
    pub handle_signals: bool,
}

impl Default for SupervisorConfig {
    /// `grace = 30s`, `bus_capacity = 1024`, `handle_signals = true`.
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            handle_signals: true,
        }
    }
}

/// Fleet-change watcher settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Capacity of each watcher → engine cluster channel.
    pub buffer: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { buffer: 128 }
    }
}

/// Polling engine settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Steady-state delay between two collections of one cluster.
    #[serde(rename = "interval_ms", deserialize_with = "millis")]
    pub interval: Duration,
    /// Cap for the failure backoff of one cluster.
    #[serde(rename = "max_interval_ms", deserialize_with = "millis")]
    pub max_interval: Duration,
    /// Upper bound for one metric collection.
    #[serde(rename = "timeout_ms", deserialize_with = "millis")]
    pub timeout: Duration,
    /// Collection workers per provider engine.
    pub workers: usize,
    /// Consecutive "not found" answers tolerated before a cluster is evicted.
    pub max_retries: u32,
    /// Capacity of the engine → delivery event channel.
    pub buffer: usize,
}

impl PollingConfig {
    /// Backoff driving the per-cluster queue: base = interval, cap = max interval.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(self.interval, self.max_interval)
    }
}

impl Default for PollingConfig {
    /// `interval = 60s`, `max_interval = 10m`, `timeout = 60s`, `workers = 10`,
    /// `max_retries = 5`, `buffer = 1000`.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(600),
            timeout: Duration::from_secs(60),
            workers: 10,
            max_retries: 5,
            buffer: 1000,
        }
    }
}

/// Event delivery settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Concurrent delivery workers.
    pub workers: usize,
    /// Retries before an event is dropped.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(rename = "retry_base_ms", deserialize_with = "millis")]
    pub retry_base: Duration,
    /// Cap for the retry delay.
    #[serde(rename = "retry_max_ms", deserialize_with = "millis")]
    pub retry_max: Duration,
    /// Jitter applied to retry delays.
    pub jitter: JitterPolicy,
    /// Upper bound for one HTTP call.
    #[serde(rename = "request_timeout_ms", deserialize_with = "millis")]
    pub request_timeout: Duration,
    /// Ingestion endpoint coordinates and credentials.
    pub endpoint: EndpointConfig,
}

impl DeliveryConfig {
    /// Backoff driving the per-event delivery queue.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(self.retry_base, self.retry_max).with_jitter(self.jitter)
    }
}

impl Default for DeliveryConfig {
    /// `workers = 5`, `max_retries = 5`, retries from 1s up to 5m, no jitter,
    /// `request_timeout = 30s`.
    fn default() -> Self {
        Self {
            workers: 5,
            max_retries: 5,
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(300),
            jitter: JitterPolicy::None,
            request_timeout: Duration::from_secs(30),
            endpoint: EndpointConfig::default(),
        }
    }
}

/// Ingestion endpoint coordinates:
/// `POST {base_url}/namespaces/{namespace}/dataStreams/{data_stream}/{version}/dataTenants/{tenant}/{env}/events`.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    /// Scheme, host and optional path prefix.
    pub base_url: String,
    /// Ingestion namespace.
    pub namespace: String,
    /// Data stream name.
    pub data_stream: String,
    /// Data stream version.
    pub version: String,
    /// Tenant environment segment.
    pub env: String,
    /// Bearer token.
    pub token: String,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("namespace", &self.namespace)
            .field("data_stream", &self.data_stream)
            .field("version", &self.version)
            .field("env", &self.env)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Logger settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact formatter.
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

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
supervisor:
  grace_ms: 5000
  handle_signals: false
polling:
  interval_ms: 30000
  max_interval_ms: 300000
  workers: 4
  max_retries: 3
delivery:
  jitter: equal
  endpoint:
    base_url: https://ingest.example.com
    namespace: kyma
    data_stream: consumption-metrics
    version: v1
    env: dev
    token: t0ken
"#;

    #[test]
    fn parses_yaml_with_defaults_for_missing_keys() {
        let cfg = Config::from_yaml_str(VALID).unwrap();
        assert_eq!(cfg.supervisor.grace, Duration::from_secs(5));
        assert!(!cfg.supervisor.handle_signals);
        assert_eq!(cfg.supervisor.bus_capacity, 1024);
        assert_eq!(cfg.polling.interval, Duration::from_secs(30));
        assert_eq!(cfg.polling.workers, 4);
        assert_eq!(cfg.polling.timeout, Duration::from_secs(60));
        assert_eq!(cfg.delivery.jitter, JitterPolicy::Equal);
        assert_eq!(cfg.delivery.endpoint.env, "dev");
        assert_eq!(cfg.watcher.buffer, 128);
    }

    #[test]
    fn polling_backoff_starts_at_interval() {
        let cfg = Config::from_yaml_str(VALID).unwrap();
        let backoff = cfg.polling.backoff();
        assert_eq!(backoff.next(0), Duration::from_secs(30));
        assert_eq!(backoff.next(10), Duration::from_secs(300));
    }

    #[test]
    fn rejects_empty_endpoint() {
        let err = Config::from_yaml_str("polling:\n  workers: 2\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "delivery.endpoint.base_url",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        let doc = VALID.replace("workers: 4", "workers: 0");
        let err = Config::from_yaml_str(&doc).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "polling.workers",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let doc = format!("{VALID}\nbogus: 1\n");
        assert!(matches!(
            Config::from_yaml_str(&doc),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let cfg = Config::from_yaml_str(VALID).unwrap();
        let dbg = format!("{:?}", cfg.delivery.endpoint);
        assert!(!dbg.contains("t0ken"));
    }
}
