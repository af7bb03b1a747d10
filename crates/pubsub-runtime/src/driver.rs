//! Transport driver seam.
//!
//! Every concrete messaging technology is reached through [`TransportDriver`].
//! Drivers are built from a [`ProviderConfig`] by the [`TransportFactory`]
//! registered for its [`TransportKind`] in a [`TransportCatalog`].

use crate::error::{ConfigurationError, TransportError};
use crate::handler::{HandlerFactory, HandlerType};
use crate::message::{Message, MessageType, QueueName};
use crate::provider::{ProviderConfig, TransportKind};
use crate::providers::InMemoryTransportFactory;
use crate::retry::RetryIntervals;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;

/// Prefetch used when no consumer in a receive point asks for one
pub const DEFAULT_PREFETCH: u32 = 16;

/// Where a receive point consumes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivePointTarget {
    /// Durable queue with a stable name
    Named(QueueName),
    /// Anonymous queue removed when the driver stops
    Ephemeral,
}

/// One handler registered on a receive point
#[derive(Clone)]
pub struct HandlerBinding {
    pub handler_type: HandlerType,
    pub message_type: MessageType,
    /// Resolves the handler instance at dispatch time
    pub factory: HandlerFactory,
}

impl std::fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("handler_type", &self.handler_type)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

/// A queue binding on a driver together with its delivery policy
#[derive(Debug, Clone)]
pub struct ReceivePoint {
    pub target: ReceivePointTarget,
    /// 0 uses the driver default
    pub prefetch_count: u32,
    pub retry: RetryIntervals,
    pub redelivery: RetryIntervals,
    pub handlers: Vec<HandlerBinding>,
}

impl ReceivePoint {
    pub fn new(target: ReceivePointTarget) -> Self {
        Self {
            target,
            prefetch_count: 0,
            retry: RetryIntervals::none(),
            redelivery: RetryIntervals::none(),
            handlers: Vec::new(),
        }
    }

    pub fn with_prefetch(mut self, prefetch_count: u32) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    pub fn with_retry(mut self, retry: RetryIntervals) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_redelivery(mut self, redelivery: RetryIntervals) -> Self {
        self.redelivery = redelivery;
        self
    }

    pub fn with_handler(mut self, handler: HandlerBinding) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Queue name for named receive points, `None` for ephemeral ones
    pub fn queue_name(&self) -> Option<&QueueName> {
        match &self.target {
            ReceivePointTarget::Named(name) => Some(name),
            ReceivePointTarget::Ephemeral => None,
        }
    }

    /// Prefetch to apply, falling back to `default` when unset
    pub fn effective_prefetch(&self, default: u32) -> u32 {
        if self.prefetch_count == 0 {
            default
        } else {
            self.prefetch_count
        }
    }
}

/// Interface implemented by every transport technology
///
/// Receive points are registered before [`start`](Self::start); once started
/// a driver may begin delivering immediately.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    /// Get transport kind
    fn transport_kind(&self) -> TransportKind;

    /// Register a receive point with all of its handlers
    async fn register_receive_point(&self, receive_point: ReceivePoint)
        -> Result<(), TransportError>;

    /// Connect and begin delivering to registered receive points
    async fn start(&self, cancel: &CancellationToken) -> Result<(), TransportError>;

    /// Publish one message
    async fn publish(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;

    /// Stop delivering and release resources
    async fn stop(&self) -> Result<(), TransportError>;
}

// ============================================================================
// Driver construction
// ============================================================================

/// Builds a driver for one configured provider
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn TransportDriver>, ConfigurationError>;
}

impl<F> TransportFactory for F
where
    F: Fn(&ProviderConfig) -> Result<Box<dyn TransportDriver>, ConfigurationError> + Send + Sync,
{
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn TransportDriver>, ConfigurationError> {
        self(config)
    }
}

/// Maps transport kinds to the factories able to build them
///
/// Ships with the in-memory factory only; every other kind is supplied by the
/// application.
#[derive(Clone)]
pub struct TransportCatalog {
    factories: HashMap<TransportKind, Arc<dyn TransportFactory>>,
}

impl TransportCatalog {
    /// Catalog with the built-in in-memory transport
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog.register(TransportKind::InMemory, InMemoryTransportFactory);
        catalog
    }

    /// Catalog with no factories at all
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register or replace the factory for a transport kind
    pub fn register<F>(&mut self, kind: TransportKind, factory: F) -> &mut Self
    where
        F: TransportFactory + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    /// Build the driver for a provider entry
    pub fn create(
        &self,
        config: &ProviderConfig,
    ) -> Result<(TransportKind, Box<dyn TransportDriver>), ConfigurationError> {
        let kind = config.transport_kind()?;
        let factory =
            self.factories
                .get(&kind)
                .ok_or_else(|| ConfigurationError::UnsupportedTransport {
                    key: config.key.clone(),
                    kind: kind.to_string(),
                })?;
        Ok((kind, factory.create(config)?))
    }
}

impl Default for TransportCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransportCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("TransportCatalog")
            .field("kinds", &kinds)
            .finish()
    }
}
