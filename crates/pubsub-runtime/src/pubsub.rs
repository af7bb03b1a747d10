//! Bootstrap: turns configuration and declared consumers into started queue systems.
//!
//! Startup runs once, on one task, in this order:
//!
//! 1. validate the configuration
//! 2. scan every discovery source for consumer descriptors
//! 3. for each provider, in key order: build its driver, bind consumers, register it
//! 4. start every driver in registration order
//!
//! Any failure aborts startup. Only a fully started registry is handed to the
//! producer.

use crate::binder::{Binder, BinderOptions};
use crate::config::PubSubConfiguration;
use crate::container::{HandlerContainer, HandlerResolver};
use crate::descriptor::{ConsumerScanner, InventoryDiscovery, TypeDiscovery};
use crate::driver::{TransportCatalog, TransportFactory};
use crate::error::{ConfigurationError, PubSubError};
use crate::producer::Producer;
use crate::provider::TransportKind;
use crate::registry::QueueSystemRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;

/// Populate and start `registry` from `configuration`.
///
/// A second call on an already initialized registry logs a warning and
/// returns without doing anything. A registry whose initialization failed
/// must be discarded.
pub async fn initialize(
    registry: &mut QueueSystemRegistry,
    configuration: &PubSubConfiguration,
    sources: &[&dyn TypeDiscovery],
    resolver: Arc<dyn HandlerResolver>,
    catalog: &TransportCatalog,
    cancel: &CancellationToken,
) -> Result<(), PubSubError> {
    if registry.is_initialized() {
        warn!("Queue systems already initialized; skipping");
        return Ok(());
    }

    configuration.validate()?;

    let scanner = match configuration.namespace_filter.as_deref().map(str::trim) {
        Some(pattern) if !pattern.is_empty() => ConsumerScanner::with_filter(pattern)?,
        _ => ConsumerScanner::new(),
    };
    let descriptors = scanner.scan(sources)?;
    info!(consumers = descriptors.len(), "Discovered consumers");

    let binder = Binder::new(
        resolver,
        BinderOptions {
            ephemeral_queues: configuration.ephemeral_queues,
        },
    );

    for provider in configuration.providers() {
        let (kind, driver) = catalog.create(provider)?;
        binder.bind(provider, &descriptors, driver.as_ref()).await?;
        registry.register(&provider.key, kind, driver)?;
    }

    registry.start_all(cancel).await?;
    registry.mark_initialized();

    info!(providers = registry.len(), "Queue systems initialized");
    Ok(())
}

/// Started queue systems plus the producer publishing to them
#[derive(Debug)]
pub struct PubSub {
    registry: Arc<QueueSystemRegistry>,
    producer: Producer,
    cancel: CancellationToken,
}

impl PubSub {
    pub fn builder() -> PubSubBuilder {
        PubSubBuilder::new()
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn registry(&self) -> &Arc<QueueSystemRegistry> {
        &self.registry
    }

    /// Token cancelled on shutdown; passed to drivers and dispatches
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop every queue system
    pub async fn shutdown(&self) {
        info!("Shutting down queue systems");
        self.registry.stop_all().await;
        self.cancel.cancel();
    }
}

/// Builder for [`PubSub`]
///
/// Without explicit discovery sources the consumers declared with
/// `consumer!` are used; without an explicit resolver a [`HandlerContainer`]
/// over those same consumers is used.
pub struct PubSubBuilder {
    configuration: Option<PubSubConfiguration>,
    sources: Vec<Box<dyn TypeDiscovery>>,
    resolver: Option<Arc<dyn HandlerResolver>>,
    catalog: TransportCatalog,
    cancel: CancellationToken,
}

impl PubSubBuilder {
    pub fn new() -> Self {
        Self {
            configuration: None,
            sources: Vec::new(),
            resolver: None,
            catalog: TransportCatalog::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn configuration(mut self, configuration: PubSubConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Add a consumer discovery source
    pub fn discovery<D: TypeDiscovery + 'static>(mut self, source: D) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn resolver<R: HandlerResolver + 'static>(self, resolver: R) -> Self {
        self.shared_resolver(Arc::new(resolver))
    }

    pub fn shared_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register the factory for a transport kind
    pub fn transport<F: TransportFactory + 'static>(mut self, kind: TransportKind, factory: F) -> Self {
        self.catalog.register(kind, factory);
        self
    }

    pub fn catalog(mut self, catalog: TransportCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Parent token for driver workers and dispatches
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run startup and return the started queue systems
    pub async fn build(self) -> Result<PubSub, PubSubError> {
        let mut configuration = self
            .configuration
            .ok_or_else(|| ConfigurationError::MissingProviders {
                section: crate::config::CONFIG_SECTION.to_string(),
            })?;
        configuration.assign_keys();

        let mut sources = self.sources;
        if sources.is_empty() {
            sources.push(Box::new(InventoryDiscovery));
        }
        let sources: Vec<&dyn TypeDiscovery> = sources.iter().map(|s| s.as_ref()).collect();

        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => {
                let mut container = HandlerContainer::new();
                container.register_discovered();
                Arc::new(container)
            }
        };

        let cancel = self.cancel.child_token();
        let mut registry = QueueSystemRegistry::new();
        if let Err(e) = initialize(
            &mut registry,
            &configuration,
            &sources,
            resolver,
            &self.catalog,
            &cancel,
        )
        .await
        {
            cancel.cancel();
            return Err(e);
        }

        let registry = Arc::new(registry);
        Ok(PubSub {
            producer: Producer::new(registry.clone()),
            registry,
            cancel,
        })
    }
}

impl Default for PubSubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PubSubBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubBuilder")
            .field("configuration", &self.configuration)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.source_name()).collect::<Vec<_>>(),
            )
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}
