//! Error types used by the pipeline runtime and its stages.
//!
//! - [`RuntimeError`] errors raised by the [`Supervisor`](crate::Supervisor) itself.
//! - [`LoopError`] errors returned by a single long-running loop.
//! - [`WatchError`] per-resource reconciliation failures in the fleet watcher.
//! - [`ProviderError`] failures reported by a provider management API.
//! - [`DeliveryError`] failures while pushing an event to the ingestion endpoint.
//! - [`ConfigError`] invalid or unreadable configuration.
//!
//! Every type provides `as_label` (stable snake_case label for logs/metrics).

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The first loop to finish returned an error; the whole pipeline unwound.
    #[error("loop {name:?} failed: {error}")]
    LoopFailed {
        /// Name of the loop that terminated first.
        name: String,
        /// The loop's error.
        error: LoopError,
    },

    /// The first loop to finish panicked.
    #[error("loop {name:?} panicked")]
    LoopPanicked {
        /// Name of the loop that panicked.
        name: String,
    },

    /// Shutdown grace period was exceeded; some loops had to be aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Loops that did not observe the stop signal in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fleetmeter::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::LoopFailed { .. } => "runtime_loop_failed",
            RuntimeError::LoopPanicked { .. } => "runtime_loop_panicked",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors returned by a supervised loop.
///
/// A loop returning **any** value (including `Ok`) stops the whole pipeline;
/// the variant only tells the operator why.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoopError {
    /// Unrecoverable setup or upstream failure (e.g. the control-plane feed is gone).
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The loop observed the stop signal.
    #[error("context cancelled")]
    Canceled,
}

impl LoopError {
    /// Convenience constructor for [`LoopError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        LoopError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LoopError::Fatal { .. } => "loop_fatal",
            LoopError::Canceled => "loop_canceled",
        }
    }
}

/// # Per-resource reconciliation failures.
///
/// None of these are fatal: the offending resource is skipped and the watcher
/// keeps processing the rest of the fleet.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// A required identity label is absent on the cluster descriptor.
    #[error("cluster {cluster} is missing label {label:?}")]
    MissingLabel {
        /// `namespace/name` of the descriptor.
        cluster: String,
        /// The missing label key.
        label: &'static str,
    },

    /// The credential secret referenced by the descriptor is unknown.
    #[error("cluster {cluster} references unknown secret {secret}")]
    SecretNotFound {
        /// `namespace/name` of the descriptor.
        cluster: String,
        /// `namespace/name` of the secret.
        secret: String,
    },

    /// Two distinct descriptors derive the same technical id.
    #[error("technical id {technical_id} of {cluster} is already owned by {owner}")]
    DuplicateTechnicalId {
        /// The colliding technical id.
        technical_id: String,
        /// `namespace/name` of the rejected descriptor.
        cluster: String,
        /// `namespace/name` of the descriptor owning the id.
        owner: String,
    },

    /// No polling engine is registered for the cluster's provider.
    #[error("cluster {cluster} has unsupported provider {provider:?}")]
    UnsupportedProvider {
        /// `namespace/name` of the descriptor.
        cluster: String,
        /// The provider type found on the descriptor.
        provider: String,
    },
}

impl WatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatchError::MissingLabel { .. } => "watch_missing_label",
            WatchError::SecretNotFound { .. } => "watch_secret_not_found",
            WatchError::DuplicateTechnicalId { .. } => "watch_duplicate_technical_id",
            WatchError::UnsupportedProvider { .. } => "watch_unsupported_provider",
        }
    }
}

/// How the polling engine reacts to a [`ProviderError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The cluster's backing infrastructure is gone; counts towards eviction.
    NotFound,
    /// The provider API is rate limiting us; never counts towards eviction.
    Throttled,
    /// Anything else; retried with the standard backoff.
    Other,
}

/// # Errors reported by a provider management API.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The requested resource does not exist.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Identifier of the missing resource.
        resource: String,
    },

    /// The provider asked us to slow down.
    #[error("throttled by provider: {message}")]
    Throttled {
        /// Provider message.
        message: String,
    },

    /// Credentials could not be turned into an API handle.
    #[error("authentication failed: {message}")]
    Auth {
        /// Provider message.
        message: String,
    },

    /// A collection did not finish within the poll timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The exceeded timeout.
        timeout: Duration,
    },

    /// The provider answered with an unexpected status code.
    #[error("provider returned status {status}: {message}")]
    Status {
        /// HTTP-like status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// Any other failure.
    #[error("provider error: {message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl ProviderError {
    /// Maps a provider status code onto an error, the way management APIs report them.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ProviderError::NotFound { resource: message },
            429 => ProviderError::Throttled { message },
            401 | 403 => ProviderError::Auth { message },
            _ => ProviderError::Status { status, message },
        }
    }

    /// Classifies the error for the polling engine's retry decision.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::NotFound { .. } => ErrorClass::NotFound,
            ProviderError::Throttled { .. } => ErrorClass::Throttled,
            _ => ErrorClass::Other,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::NotFound { .. } => "provider_not_found",
            ProviderError::Throttled { .. } => "provider_throttled",
            ProviderError::Auth { .. } => "provider_auth",
            ProviderError::Timeout { .. } => "provider_timeout",
            ProviderError::Status { .. } => "provider_status",
            ProviderError::Other { .. } => "provider_other",
        }
    }
}

/// # Errors produced while delivering an event to the ingestion endpoint.
///
/// Status-specific variants exist for diagnostics only; every variant except
/// [`DeliveryError::Serialization`] is retried identically.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The payload could not be turned into a request body. Never retried.
    #[error("failed to serialize event payload: {0}")]
    Serialization(String),

    /// `400 Bad Request`.
    #[error("ingestion endpoint rejected the event as malformed")]
    BadRequest,

    /// `404 Not Found`: namespace/stream/tenant coordinates are wrong or missing.
    #[error("ingestion endpoint did not recognise the routing parameters")]
    MissingParameters,

    /// `413 Payload Too Large`.
    #[error("event payload is too large for the ingestion endpoint")]
    PayloadTooLarge,

    /// Any other non-2xx status.
    #[error("ingestion endpoint returned unexpected status {status}")]
    UnexpectedStatus {
        /// The returned status code.
        status: u16,
    },

    /// Network-level failure (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Maps a non-success HTTP status onto a diagnostic error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => DeliveryError::BadRequest,
            404 => DeliveryError::MissingParameters,
            413 => DeliveryError::PayloadTooLarge,
            status => DeliveryError::UnexpectedStatus { status },
        }
    }

    /// Retrying cannot fix a malformed payload.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Serialization(_))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Serialization(_) => "delivery_serialization",
            DeliveryError::BadRequest => "delivery_bad_request",
            DeliveryError::MissingParameters => "delivery_missing_parameters",
            DeliveryError::PayloadTooLarge => "delivery_payload_too_large",
            DeliveryError::UnexpectedStatus { .. } => "delivery_unexpected_status",
            DeliveryError::Transport(_) => "delivery_transport",
        }
    }
}

/// # Configuration errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field holds a value the pipeline cannot run with.
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The global logger could not be installed.
    #[error("failed to install logger: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::Logging(_) => "config_logging",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_codes_classify() {
        assert_eq!(
            ProviderError::from_status(404, "rg").class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            ProviderError::from_status(429, "slow down").class(),
            ErrorClass::Throttled
        );
        assert_eq!(
            ProviderError::from_status(500, "boom").class(),
            ErrorClass::Other
        );
        assert_eq!(
            ProviderError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .class(),
            ErrorClass::Other
        );
    }

    #[test]
    fn delivery_status_codes_map_to_kinds() {
        assert!(matches!(
            DeliveryError::from_status(400),
            DeliveryError::BadRequest
        ));
        assert!(matches!(
            DeliveryError::from_status(404),
            DeliveryError::MissingParameters
        ));
        assert!(matches!(
            DeliveryError::from_status(413),
            DeliveryError::PayloadTooLarge
        ));
        assert!(matches!(
            DeliveryError::from_status(429),
            DeliveryError::UnexpectedStatus { status: 429 }
        ));
    }

    #[test]
    fn only_serialization_is_terminal() {
        assert!(DeliveryError::Serialization("eof".into()).is_terminal());
        assert!(!DeliveryError::BadRequest.is_terminal());
        assert!(!DeliveryError::PayloadTooLarge.is_terminal());
        assert!(!DeliveryError::Transport("reset".into()).is_terminal());
    }
}
