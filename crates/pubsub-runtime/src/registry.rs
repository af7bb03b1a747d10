//! Queue system registry for multi-provider routing.
//!
//! This module provides [`QueueSystemRegistry`], which associates provider keys
//! (e.g. `"InMemory1"`, `"orders-bus"`) with their started transport drivers.
//! The registry is populated once on a single initialising task, started, and
//! then shared read-only (behind an `Arc`) with producers.
//!
//! Keys are case-insensitive: `"Orders"` and `"orders"` name the same provider.

use crate::driver::TransportDriver;
use crate::error::{PubSubError, TransportError};
use crate::message::Message;
use crate::provider::TransportKind;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// ============================================================================
// ProviderKey
// ============================================================================

/// Case-insensitive identifier for a configured provider.
///
/// The original spelling is kept for display; equality and hashing use the
/// lowercase form.
///
/// # Examples
///
/// ```rust
/// use pubsub_runtime::registry::ProviderKey;
///
/// let key = ProviderKey::new("InMemory1").unwrap();
/// assert_eq!(key.as_str(), "InMemory1");
/// assert_eq!(key, ProviderKey::new("inmemory1").unwrap());
/// assert!(ProviderKey::new("  ").is_err());
/// ```
#[derive(Debug, Clone, Eq)]
pub struct ProviderKey {
    display: String,
    normalized: String,
}

impl ProviderKey {
    /// Create a new key, rejecting empty or whitespace-only values
    pub fn new(value: impl Into<String>) -> Result<Self, PubSubError> {
        let display = value.into().trim().to_string();
        if display.is_empty() {
            return Err(PubSubError::Configuration(
                crate::error::ConfigurationError::EmptyKey,
            ));
        }
        let normalized = display.to_lowercase();
        Ok(Self {
            display,
            normalized,
        })
    }

    /// Return the key as originally spelled
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Check whether a raw key names this provider
    pub fn matches(&self, raw: &str) -> bool {
        self.normalized == raw.trim().to_lowercase()
    }
}

impl PartialEq for ProviderKey {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Hash for ProviderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl std::fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

// ============================================================================
// QueueSystem
// ============================================================================

/// A named handle to one transport driver
///
/// The driver is owned exclusively by this queue system.
pub struct QueueSystem {
    key: ProviderKey,
    transport_kind: TransportKind,
    driver: Box<dyn TransportDriver>,
}

impl QueueSystem {
    pub fn key(&self) -> &ProviderKey {
        &self.key
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    /// Publish one message through this queue system's driver
    pub async fn publish(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        self.driver.publish(message, cancel).await
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        self.driver.start(cancel).await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.driver.stop().await
    }
}

impl std::fmt::Debug for QueueSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSystem")
            .field("key", &self.key)
            .field("transport_kind", &self.transport_kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// QueueSystemRegistry
// ============================================================================

/// Registry mapping provider keys to their queue systems.
///
/// Populated with [`register`](Self::register) and then started exactly once
/// with [`start_all`](Self::start_all), which also seals it. Producers only
/// ever receive the sealed registry behind an `Arc`, so readers never observe
/// a partially populated registry and the read path needs no locking.
#[derive(Default)]
pub struct QueueSystemRegistry {
    systems: Vec<QueueSystem>,
    index: HashMap<ProviderKey, usize>,
    started: bool,
    already_initialized: bool,
}

impl QueueSystemRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under a provider key.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::DuplicateKey`] if the key is already present
    /// (case-insensitive), and [`PubSubError::RegistrySealed`] after
    /// [`start_all`](Self::start_all).
    pub fn register(
        &mut self,
        key: &str,
        transport_kind: TransportKind,
        driver: Box<dyn TransportDriver>,
    ) -> Result<&mut Self, PubSubError> {
        if self.started {
            return Err(PubSubError::RegistrySealed);
        }

        let key = ProviderKey::new(key)?;
        if self.index.contains_key(&key) {
            return Err(PubSubError::DuplicateKey {
                key: key.as_str().to_string(),
            });
        }

        info!(provider = %key, transport = %transport_kind, "Registered queue system");
        self.index.insert(key.clone(), self.systems.len());
        self.systems.push(QueueSystem {
            key,
            transport_kind,
            driver,
        });
        Ok(self)
    }

    /// Start every registered driver, in registration order.
    ///
    /// Must be called once, after every consumer binding is wired. The first
    /// failing driver aborts the start: drivers started before it are stopped
    /// again and the error is returned.
    pub async fn start_all(&mut self, cancel: &CancellationToken) -> Result<(), PubSubError> {
        if self.started {
            return Err(PubSubError::AlreadyStarted);
        }
        self.started = true;

        for (position, system) in self.systems.iter().enumerate() {
            if let Err(source) = system.start(cancel).await {
                error!(provider = %system.key, error = %source, "Queue system failed to start");
                for started in self.systems[..position].iter().rev() {
                    if let Err(e) = started.stop().await {
                        warn!(provider = %started.key, error = %e, "Failed to stop queue system");
                    }
                }
                return Err(PubSubError::TransportStart {
                    provider: system.key.as_str().to_string(),
                    source,
                });
            }
            info!(provider = %system.key, "Queue system started");
        }

        Ok(())
    }

    /// Stop every driver. Failures are logged and the remaining drivers are still stopped.
    pub async fn stop_all(&self) {
        for system in &self.systems {
            if let Err(e) = system.stop().await {
                warn!(provider = %system.key, error = %e, "Failed to stop queue system");
            }
        }
    }

    /// Resolve the queue systems targeted by `keys`.
    ///
    /// Empty `keys` returns every registered queue system. Otherwise the
    /// matching subset is returned (case-insensitive, each system at most
    /// once); keys that match nothing are skipped as long as at least one key
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::NoMatchingProvider`] when none of the keys match.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pubsub_runtime::{InMemoryDriver, QueueSystemRegistry, TransportKind};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # tokio_test::block_on(async {
    /// let mut registry = QueueSystemRegistry::new();
    /// for key in ["Orders", "Audit"] {
    ///     registry
    ///         .register(key, TransportKind::InMemory, Box::new(InMemoryDriver::new(key)))
    ///         .unwrap();
    /// }
    /// registry.start_all(&CancellationToken::new()).await.unwrap();
    ///
    /// assert_eq!(registry.resolve::<&str>(&[]).unwrap().len(), 2);
    /// assert_eq!(registry.resolve(&["AUDIT", "unknown"]).unwrap().len(), 1);
    /// assert!(registry.resolve(&["unknown"]).is_err());
    /// registry.stop_all().await;
    /// # });
    /// ```
    pub fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<&QueueSystem>, PubSubError> {
        if keys.is_empty() {
            return Ok(self.systems.iter().collect());
        }

        let mut positions: Vec<usize> = Vec::new();
        for raw in keys {
            let found = ProviderKey::new(raw.as_ref())
                .ok()
                .and_then(|key| self.index.get(&key).copied());
            match found {
                Some(position) if !positions.contains(&position) => positions.push(position),
                Some(_) => {}
                None => warn!(key = raw.as_ref(), "Skipping unknown provider key"),
            }
        }

        if positions.is_empty() {
            return Err(PubSubError::NoMatchingProvider {
                keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
            });
        }

        Ok(positions.into_iter().map(|p| &self.systems[p]).collect())
    }

    /// Look up one queue system by key.
    pub fn get(&self, key: &str) -> Option<&QueueSystem> {
        let key = ProviderKey::new(key).ok()?;
        self.index.get(&key).map(|p| &self.systems[*p])
    }

    /// Check whether a provider is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &ProviderKey> {
        self.systems.iter().map(|s| &s.key)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_initialized(&self) -> bool {
        self.already_initialized
    }

    /// Set the initialization flag, returning `false` if it was already set.
    pub(crate) fn mark_initialized(&mut self) -> bool {
        !std::mem::replace(&mut self.already_initialized, true)
    }
}

impl std::fmt::Debug for QueueSystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSystemRegistry")
            .field("systems", &self.systems)
            .field("started", &self.started)
            .field("already_initialized", &self.already_initialized)
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
