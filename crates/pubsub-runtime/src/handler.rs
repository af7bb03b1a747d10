//! Consumer traits and the type-erased handler interface used by transport drivers.
//!
//! Applications implement [`Consumer`] for each message they want to receive.
//! Transport drivers only ever see [`MessageHandler`], produced at dispatch time
//! by a [`HandlerFactory`].

use crate::error::{DispatchError, HandlerResolutionError};
use crate::message::{Message, MessageId, MessageType, Timestamp};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identifier of a handler type (its fully-qualified Rust type name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerType(String);

impl HandlerType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandlerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the object-construction collaborator manages handler instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerLifetime {
    /// One instance, created on first dispatch and reused afterwards
    #[default]
    Singleton,
    /// A new instance for every dispatch
    Transient,
}

/// One message handed to one handler by a transport driver
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub provider_key: String,
    pub queue_name: String,
    /// Local attempt number, 0 for the first try
    pub attempt: u32,
    /// Number of times the transport has redelivered the message
    pub redelivery_count: u32,
    pub cancellation: CancellationToken,
}

/// Decoded message plus delivery metadata passed to a [`Consumer`]
#[derive(Debug, Clone)]
pub struct ConsumeContext<M> {
    pub message: M,
    pub message_id: MessageId,
    pub sent_at: Timestamp,
    pub headers: HashMap<String, String>,
    pub provider_key: String,
    pub queue_name: String,
    pub attempt: u32,
    pub redelivery_count: u32,
    pub cancellation: CancellationToken,
}

/// Application-supplied logic invoked once per delivered message
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pubsub_runtime::{ConsumeContext, Consumer};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct OrderPlaced {
///     order_id: u64,
/// }
///
/// struct OrderAuditor;
///
/// #[async_trait]
/// impl Consumer for OrderAuditor {
///     type Message = OrderPlaced;
///
///     async fn consume(&self, ctx: ConsumeContext<OrderPlaced>) -> anyhow::Result<()> {
///         println!("order {} placed", ctx.message.order_id);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    type Message: DeserializeOwned + Send + Sync + 'static;

    async fn consume(&self, context: ConsumeContext<Self::Message>) -> anyhow::Result<()>;
}

/// Type-erased handler invoked by transport drivers
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn handler_type(&self) -> HandlerType;

    fn message_type(&self) -> MessageType;

    async fn handle(&self, delivery: &Delivery) -> Result<(), DispatchError>;
}

/// Resolves a handler instance at dispatch time
pub type HandlerFactory =
    Arc<dyn Fn() -> Result<Arc<dyn MessageHandler>, HandlerResolutionError> + Send + Sync>;

/// Adapts a typed [`Consumer`] to [`MessageHandler`]
pub struct ConsumerHandler<C> {
    consumer: C,
}

impl<C: Consumer> ConsumerHandler<C> {
    pub fn new(consumer: C) -> Self {
        Self { consumer }
    }

    pub fn into_handler(consumer: C) -> Arc<dyn MessageHandler> {
        Arc::new(Self::new(consumer))
    }
}

#[async_trait]
impl<C: Consumer> MessageHandler for ConsumerHandler<C> {
    fn handler_type(&self) -> HandlerType {
        HandlerType::of::<C>()
    }

    fn message_type(&self) -> MessageType {
        MessageType::of::<C::Message>()
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), DispatchError> {
        if delivery.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let message: C::Message = delivery.message.decode()?;
        let context = ConsumeContext {
            message,
            message_id: delivery.message.id.clone(),
            sent_at: delivery.message.sent_at.clone(),
            headers: delivery.message.headers.clone(),
            provider_key: delivery.provider_key.clone(),
            queue_name: delivery.queue_name.clone(),
            attempt: delivery.attempt,
            redelivery_count: delivery.redelivery_count,
            cancellation: delivery.cancellation.clone(),
        };

        self.consumer
            .consume(context)
            .await
            .map_err(|e| DispatchError::Handler {
                handler_type: HandlerType::of::<C>().to_string(),
                message: format!("{:#}", e),
            })
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
