//! Provider types and per-provider configuration.

use crate::error::ConfigurationError;
use crate::retry::RetryIntervals;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Enumeration of supported transport technologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    /// In-process transport, not for production use
    InMemory,
    /// AMQP 0.9.1 style broker (RabbitMQ)
    BrokerA,
    /// JMS/OpenWire style broker (ActiveMQ)
    BrokerB,
    /// Cloud queue service (Amazon SQS)
    CloudQueue,
    /// Cloud message bus (Azure Service Bus)
    CloudBus,
    /// gRPC transport between peer processes
    Grpc,
    /// Application-supplied transport
    Custom,
}

impl TransportKind {
    pub const ALL: [TransportKind; 7] = [
        Self::InMemory,
        Self::BrokerA,
        Self::BrokerB,
        Self::CloudQueue,
        Self::CloudBus,
        Self::Grpc,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "InMemory",
            Self::BrokerA => "BrokerA",
            Self::BrokerB => "BrokerB",
            Self::CloudQueue => "CloudQueue",
            Self::CloudBus => "CloudBus",
            Self::Grpc => "Grpc",
            Self::Custom => "Custom",
        }
    }

    /// Check if the transport needs a connection string to reach its broker
    pub fn requires_connection_string(&self) -> bool {
        !matches!(self, Self::InMemory | Self::Custom)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a transport type name is not one of the supported kinds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported transport type '{0}'")]
pub struct UnknownTransportKind(pub String);

impl FromStr for TransportKind {
    type Err = UnknownTransportKind;

    /// Case-insensitive; also accepts the concrete technology names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inmemory" => Ok(Self::InMemory),
            "brokera" | "rabbitmq" => Ok(Self::BrokerA),
            "brokerb" | "activemq" => Ok(Self::BrokerB),
            "cloudqueue" | "amazonsqs" => Ok(Self::CloudQueue),
            "cloudbus" | "azureservicebus" => Ok(Self::CloudBus),
            "grpc" => Ok(Self::Grpc),
            "custom" => Ok(Self::Custom),
            _ => Err(UnknownTransportKind(s.to_string())),
        }
    }
}

// ============================================================================
// ProviderConfig
// ============================================================================

/// Configuration for one transport instance ("queue system")
///
/// `key` is never read from the entry body; it is assigned from the entry's
/// name in the provider map.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(skip)]
    pub key: String,

    /// Transport type name, validated into a [`TransportKind`] at startup
    #[serde(rename = "type", alias = "Type")]
    pub transport_type: String,

    #[serde(default, alias = "ConnectionString")]
    pub connection_string: String,

    /// Maps to an access key for cloud queue services
    #[serde(default, alias = "UserName")]
    pub user_name: String,

    /// Maps to a secret key for cloud queue services
    #[serde(default, alias = "Password")]
    pub password: String,

    #[serde(default, alias = "UseSsl")]
    pub use_ssl: bool,

    #[serde(default, alias = "SslCertificatePath")]
    pub ssl_certificate_path: String,

    #[serde(default, alias = "SslCertificatePassphrase")]
    pub ssl_certificate_passphrase: String,

    #[serde(default, alias = "Servers")]
    pub servers: Vec<String>,

    /// Local retry intervals; keep these few and short
    #[serde(default, alias = "Retries", with = "durations")]
    pub retries: Vec<Duration>,

    /// Broker redelivery intervals, used once local retries are exhausted
    #[serde(default, alias = "Redeliveries", with = "durations")]
    pub redeliveries: Vec<Duration>,
}

impl ProviderConfig {
    /// Create a provider configuration for a transport kind
    pub fn new(kind: TransportKind) -> Self {
        Self {
            key: String::new(),
            transport_type: kind.as_str().to_string(),
            connection_string: String::new(),
            user_name: String::new(),
            password: String::new(),
            use_ssl: false,
            ssl_certificate_path: String::new(),
            ssl_certificate_passphrase: String::new(),
            servers: Vec::new(),
            retries: Vec::new(),
            redeliveries: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    pub fn with_credentials(mut self, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self.password = password.into();
        self
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_retries(mut self, retries: Vec<Duration>) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_redeliveries(mut self, redeliveries: Vec<Duration>) -> Self {
        self.redeliveries = redeliveries;
        self
    }

    /// Parse the configured transport type
    pub fn transport_kind(&self) -> Result<TransportKind, ConfigurationError> {
        self.transport_type
            .parse()
            .map_err(|e: UnknownTransportKind| ConfigurationError::UnsupportedTransport {
                key: self.key.clone(),
                kind: e.0,
            })
    }

    /// Local retry policy for receive points on this provider
    pub fn retry_policy(&self) -> RetryIntervals {
        RetryIntervals::new(self.retries.clone())
    }

    /// Redelivery policy for receive points on this provider
    pub fn redelivery_policy(&self) -> RetryIntervals {
        RetryIntervals::new(self.redeliveries.clone())
    }

    /// Validate one provider entry
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.key.trim().is_empty() {
            return Err(ConfigurationError::EmptyKey);
        }

        let kind = self.transport_kind()?;

        if kind.requires_connection_string() && self.connection_string.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                key: self.key.clone(),
                field: "connection_string".to_string(),
                message: format!("required for transport type {}", kind),
            });
        }

        if let Some(server) = self.servers.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigurationError::InvalidValue {
                key: self.key.clone(),
                field: "servers".to_string(),
                message: format!("empty server entry '{}'", server),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &str) -> &str {
            if value.is_empty() {
                ""
            } else {
                "<REDACTED>"
            }
        }

        f.debug_struct("ProviderConfig")
            .field("key", &self.key)
            .field("transport_type", &self.transport_type)
            .field("connection_string", &self.connection_string)
            .field("user_name", &self.user_name)
            .field("password", &redact(&self.password))
            .field("use_ssl", &self.use_ssl)
            .field("ssl_certificate_path", &self.ssl_certificate_path)
            .field(
                "ssl_certificate_passphrase",
                &redact(&self.ssl_certificate_passphrase),
            )
            .field("servers", &self.servers)
            .field("retries", &self.retries)
            .field("redeliveries", &self.redeliveries)
            .finish()
    }
}

// ============================================================================
// Duration parsing
// ============================================================================

/// Parse an interval from seconds (`"5"`, `"0.25"`), a suffixed value
/// (`"250ms"`, `"5s"`, `"2m"`, `"1h"`) or a span (`"00:00:05"`, `"1.02:00:00.5"`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }

    if let Ok(seconds) = text.parse::<f64>() {
        return seconds_to_duration(seconds, input);
    }

    if text.contains(':') {
        return parse_span(text)
            .ok_or_else(|| format!("invalid or out of range time span '{}'", input));
    }

    let value = |number: &str| {
        number
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("unrecognised duration '{}'", input))
    };

    let seconds = if let Some(n) = text.strip_suffix("ms") {
        value(n)? / 1000.0
    } else if let Some(n) = text.strip_suffix('s') {
        value(n)?
    } else if let Some(n) = text.strip_suffix('m') {
        value(n)? * 60.0
    } else if let Some(n) = text.strip_suffix('h') {
        value(n)? * 3600.0
    } else {
        return Err(format!("unrecognised duration '{}'", input));
    };
    seconds_to_duration(seconds, input)
}

fn seconds_to_duration(seconds: f64, input: &str) -> Result<Duration, String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("duration must be a non-negative number: '{}'", input));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("duration out of range: '{}'", input))
}

/// `[d.]hh:mm:ss[.fff]`
fn parse_span(text: &str) -> Option<Duration> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => (d.parse::<u64>().ok()?, h.parse::<u64>().ok()?),
        None => (0, parts[0].parse::<u64>().ok()?),
    };
    let minutes = parts[1].parse::<u64>().ok()?;
    let seconds = parts[2].parse::<f64>().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}

/// Serde adapter for interval lists
mod durations {
    use super::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(f64),
        Text(String),
    }

    pub fn serialize<S>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|d| d.as_secs_f64()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<Vec<RawDuration>> = Option::deserialize(deserializer)?;
        raw.unwrap_or_default()
            .into_iter()
            .map(|value| match value {
                RawDuration::Seconds(seconds) => parse_duration(&seconds.to_string()),
                RawDuration::Text(text) => parse_duration(&text),
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
