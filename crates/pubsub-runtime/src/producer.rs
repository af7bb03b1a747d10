//! Fan-out publishing across queue systems.

use crate::error::{PubSubError, PublishError, TargetFailure};
use crate::message::{Message, MessageId};
use crate::registry::{ProviderKey, QueueSystemRegistry};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: MessageId,
    /// Every queue system that accepted the message
    pub accepted_by: Vec<ProviderKey>,
}

/// Publishing interface, implemented by [`Producer`] and by test doubles
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publish a message to the queue systems named by `keys`, or to all of them when `keys` is empty
    async fn publish_message(
        &self,
        message: Message,
        keys: &[&str],
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PubSubError>;
}

/// Publishes one logical message to one, several or all queue systems.
///
/// Every resolved target gets exactly one publish attempt and all attempts
/// run concurrently. The call waits for every attempt to finish and fails if
/// any of them failed; targets that succeeded are listed in the error.
#[derive(Debug, Clone)]
pub struct Producer {
    registry: Arc<QueueSystemRegistry>,
}

impl Producer {
    pub fn new(registry: Arc<QueueSystemRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<QueueSystemRegistry> {
        &self.registry
    }

    /// Serialize `payload` and publish it
    pub async fn publish<T>(&self, payload: &T, keys: &[&str]) -> Result<PublishReceipt, PubSubError>
    where
        T: Serialize + 'static,
    {
        self.publish_with_cancel(payload, keys, &CancellationToken::new())
            .await
    }

    /// Serialize `payload` and publish it, passing `cancel` to every driver
    pub async fn publish_with_cancel<T>(
        &self,
        payload: &T,
        keys: &[&str],
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PubSubError>
    where
        T: Serialize + 'static,
    {
        let message = Message::from_payload(payload)?;
        self.publish_message(message, keys, cancel).await
    }
}

#[async_trait]
impl MessageProducer for Producer {
    async fn publish_message(
        &self,
        message: Message,
        keys: &[&str],
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt, PubSubError> {
        // Resolution failure means no target is attempted.
        let targets = self.registry.resolve(keys)?;
        let message_id = message.id.clone();

        let span = info_span!(
            "publish",
            message_id = %message.id,
            message_type = %message.message_type,
            targets = targets.len()
        );

        async move {
            let attempts = targets.iter().map(|system| {
                let message = message.clone();
                async move { (system.key().clone(), system.publish(message, cancel).await) }
            });
            let results = join_all(attempts).await;

            let mut failures = Vec::new();
            let mut succeeded = Vec::new();
            for (provider, result) in results {
                match result {
                    Ok(()) => succeeded.push(provider),
                    Err(e) => {
                        error!(provider = %provider, error = %e, "Publish failed");
                        failures.push(TargetFailure { provider, error: e });
                    }
                }
            }

            match PublishError::from_parts(failures, succeeded.clone()) {
                Some(e) => Err(PubSubError::Publish(e)),
                None => {
                    debug!(accepted = succeeded.len(), "Message published");
                    Ok(PublishReceipt {
                        message_id,
                        accepted_by: succeeded,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}
