//! Error types for routing, binding, dispatch, and publish operations.

use crate::registry::ProviderKey;
use std::time::Duration;
use thiserror::Error;

/// Top-level error for every pub/sub operation
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Duplicate provider key: {key}")]
    DuplicateKey { key: String },

    #[error("Unable to find queue system with specified key(s): {}", keys.join(","))]
    NoMatchingProvider { keys: Vec<String> },

    #[error("Queue systems are already started; no further providers can be registered")]
    RegistrySealed,

    #[error("Queue systems were already started")]
    AlreadyStarted,

    #[error("Failed to start transport for provider '{provider}': {source}")]
    TransportStart {
        provider: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to bind receive point '{queue}' on provider '{provider}': {source}")]
    Binding {
        provider: String,
        queue: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Consumer discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

impl PubSubError {
    /// Check if the error is fatal to startup
    pub fn is_startup_fatal(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::DuplicateKey { .. } => true,
            Self::RegistrySealed => true,
            Self::AlreadyStarted => true,
            Self::TransportStart { .. } => true,
            Self::Binding { .. } => true,
            Self::Discovery(_) => true,
            Self::NoMatchingProvider { .. } => false,
            Self::Publish(_) => false,
            Self::Serialization(_) => false,
        }
    }

    /// Check if retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Publish(e) => e.is_transient(),
            Self::TransportStart { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Errors reported by a transport driver
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport has not been started")]
    NotStarted,

    #[error("Transport is already started; receive points can no longer be registered")]
    AlreadyStarted,

    #[error("Receive point '{name}' is already registered")]
    DuplicateReceivePoint { name: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
}

impl TransportError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotStarted => false,
            Self::AlreadyStarted => false,
            Self::DuplicateReceivePoint { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::Timeout { .. } => true,
            Self::Cancelled => false,
            Self::ProviderError { .. } => true, // Provider-specific errors are usually transient
            Self::Serialization(_) => false,
        }
    }
}

/// Failure of a single fan-out target
#[derive(Debug)]
pub struct TargetFailure {
    pub provider: ProviderKey,
    pub error: TransportError,
}

/// Aggregated outcome of a fan-out publish where at least one target failed
///
/// Every target had finished (one way or another) before this error was built.
/// The delivery state of the targets listed in `succeeded` is "accepted"; the
/// state of the failed targets is unknown.
#[derive(Debug)]
pub struct PublishError {
    failures: Vec<TargetFailure>,
    succeeded: Vec<ProviderKey>,
}

impl PublishError {
    /// Create from the per-target results. Returns `None` when nothing failed.
    pub fn from_parts(failures: Vec<TargetFailure>, succeeded: Vec<ProviderKey>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self {
                failures,
                succeeded,
            })
        }
    }

    /// First failure encountered, in target resolution order
    pub fn first_failure(&self) -> &TargetFailure {
        &self.failures[0]
    }

    pub fn failures(&self) -> &[TargetFailure] {
        &self.failures
    }

    pub fn succeeded(&self) -> &[ProviderKey] {
        &self.succeeded
    }

    /// Transient only when every failing target failed transiently
    pub fn is_transient(&self) -> bool {
        self.failures.iter().all(|f| f.error.is_transient())
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let first = self.first_failure();
        write!(
            f,
            "Publish failed on {} of {} target(s); first failure on '{}': {}",
            self.failures.len(),
            self.failures.len() + self.succeeded.len(),
            first.provider,
            first.error
        )
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.first_failure().error)
    }
}

/// Errors raised while dispatching one delivery to one handler
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Fatal: {0}")]
    HandlerResolution(#[from] HandlerResolutionError),

    #[error("Message could not be decoded: {0}")]
    Deserialization(#[from] SerializationError),

    #[error("Handler '{handler_type}' failed: {message}")]
    Handler {
        handler_type: String,
        message: String,
    },

    #[error("Dispatch was cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Resolution failures are fatal to the dispatch in progress
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HandlerResolution(_))
    }
}

/// Errors raised by the object-construction collaborator
#[derive(Debug, Clone, Error)]
pub enum HandlerResolutionError {
    #[error("unable to resolve handler '{handler_type}': not registered")]
    NotRegistered { handler_type: String },

    #[error("unable to construct handler '{handler_type}': {message}")]
    ConstructionFailed {
        handler_type: String,
        message: String,
    },
}

/// Errors raised by the type-discovery collaborator
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid name filter '{pattern}': {message}")]
    InvalidFilter { pattern: String, message: String },

    #[error("Discovery source '{source_name}' failed: {message}")]
    SourceFailed {
        source_name: String,
        message: String,
    },
}

/// Errors during message serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message of type '{actual}' cannot be decoded as '{expected}'")]
    TypeMismatch { expected: String, actual: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Null or empty provider map in configuration, check config section '{section}'")]
    MissingProviders { section: String },

    #[error("Provider key must not be empty")]
    EmptyKey,

    #[error("Provider keys must be unique (case-insensitive): '{key}'")]
    DuplicateKey { key: String },

    #[error("Provider type '{kind}' is not supported (provider '{key}')")]
    UnsupportedTransport { key: String, kind: String },

    #[error("Invalid value for '{field}' on provider '{key}': {message}")]
    InvalidValue {
        key: String,
        field: String,
        message: String,
    },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors for domain identifiers
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
