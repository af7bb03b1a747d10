//! Wires consumer descriptors into a provider's transport driver.
//!
//! For one provider the binder keeps the descriptors that bind to it, groups
//! them by resolved queue name and registers one receive point per group:
//!
//! ```text
//! descriptors ──filter(provider key)──► group(queue name) ──► ReceivePoint
//!                                                             ├─ prefetch = max non-zero
//!                                                             ├─ retry / redelivery policy
//!                                                             └─ handler factories
//! ```
//!
//! Handler instances are never created here; each binding carries a factory
//! that asks the [`HandlerResolver`] for an instance at dispatch time.

use crate::container::HandlerResolver;
use crate::descriptor::ConsumerDescriptor;
use crate::driver::{HandlerBinding, ReceivePoint, ReceivePointTarget, TransportDriver};
use crate::error::{ConfigurationError, PubSubError};
use crate::handler::HandlerFactory;
use crate::message::QueueName;
use crate::provider::ProviderConfig;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
#[path = "binder_tests.rs"]
mod tests;

/// Binder behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinderOptions {
    /// Bind every group to an anonymous, auto-removed receive point
    pub ephemeral_queues: bool,
}

/// One queue and the consumers sharing it on a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue_name: String,
    /// Maximum non-zero prefetch of the group, 0 when none asked for one
    pub prefetch_count: u32,
    pub consumers: Vec<ConsumerDescriptor>,
}

/// Binds consumers to transport drivers
#[derive(Clone)]
pub struct Binder {
    resolver: Arc<dyn HandlerResolver>,
    options: BinderOptions,
}

impl Binder {
    pub fn new(resolver: Arc<dyn HandlerResolver>, options: BinderOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> BinderOptions {
        self.options
    }

    /// Group the descriptors bound to `provider_key` by queue, in first-seen order
    pub fn plan(&self, provider_key: &str, descriptors: &[ConsumerDescriptor]) -> Vec<QueueBinding> {
        let mut groups: Vec<QueueBinding> = Vec::new();

        for descriptor in descriptors.iter().filter(|d| d.binds_to(provider_key)) {
            let queue_name = descriptor.resolved_queue_name();
            match groups.iter_mut().find(|g| g.queue_name == queue_name) {
                Some(group) => {
                    group.prefetch_count = group.prefetch_count.max(descriptor.prefetch_count);
                    group.consumers.push(descriptor.clone());
                }
                None => groups.push(QueueBinding {
                    queue_name: queue_name.into_owned(),
                    prefetch_count: descriptor.prefetch_count,
                    consumers: vec![descriptor.clone()],
                }),
            }
        }

        groups
    }

    /// Register one receive point per queue group on `driver`.
    ///
    /// Returns the number of receive points registered.
    pub async fn bind(
        &self,
        provider: &ProviderConfig,
        descriptors: &[ConsumerDescriptor],
        driver: &dyn TransportDriver,
    ) -> Result<usize, PubSubError> {
        let groups = self.plan(&provider.key, descriptors);
        let retry = provider.retry_policy();
        let redelivery = provider.redelivery_policy();

        for group in &groups {
            let target = if self.options.ephemeral_queues {
                ReceivePointTarget::Ephemeral
            } else {
                let name = QueueName::new(group.queue_name.as_str()).map_err(|e| {
                    ConfigurationError::InvalidValue {
                        key: provider.key.clone(),
                        field: "queue_name".to_string(),
                        message: format!("'{}': {}", group.queue_name, e),
                    }
                })?;
                ReceivePointTarget::Named(name)
            };

            let mut receive_point = ReceivePoint::new(target)
                .with_prefetch(group.prefetch_count)
                .with_retry(retry.clone())
                .with_redelivery(redelivery.clone());
            for consumer in &group.consumers {
                receive_point = receive_point.with_handler(self.handler_binding(consumer));
            }

            driver
                .register_receive_point(receive_point)
                .await
                .map_err(|source| PubSubError::Binding {
                    provider: provider.key.clone(),
                    queue: group.queue_name.clone(),
                    source,
                })?;

            debug!(
                provider = %provider.key,
                queue = %group.queue_name,
                consumers = group.consumers.len(),
                prefetch = group.prefetch_count,
                "Bound receive point"
            );
        }

        info!(provider = %provider.key, receive_points = groups.len(), "Consumers bound");
        Ok(groups.len())
    }

    fn handler_binding(&self, descriptor: &ConsumerDescriptor) -> HandlerBinding {
        let resolver = self.resolver.clone();
        let handler_type = descriptor.handler_type.clone();
        let factory: HandlerFactory = Arc::new(move || resolver.resolve(&handler_type));

        HandlerBinding {
            handler_type: descriptor.handler_type.clone(),
            message_type: descriptor.message_type.clone(),
            factory,
        }
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
