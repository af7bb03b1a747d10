//! # PubSub Runtime
//!
//! Multi-provider publish/subscribe routing over independently configured
//! transports ("queue systems").
//!
//! This library provides:
//! - A registry of named queue systems, each wrapping one transport driver
//! - Consumer declaration and discovery, with provider affinity and queue naming
//! - Binding of consumers to receive points with retry, redelivery and prefetch policy
//! - A producer fanning one publish out to one, several or all queue systems
//! - An in-memory reference transport
//!
//! ## Module Organization
//!
//! - [`config`] - Provider map and loading
//! - [`descriptor`] - Consumer declaration and scanning
//! - [`container`] - Handler construction at dispatch time
//! - [`driver`] - Transport driver seam and factories
//! - [`registry`] - Queue system registry
//! - [`binder`] - Consumer to receive point wiring
//! - [`producer`] - Fan-out publishing
//! - [`pubsub`] - Startup sequence
//!
//! ## Example
//!
//! ```rust,no_run
//! use pubsub_runtime::{PubSub, PubSubConfiguration, ProviderConfig, TransportKind};
//!
//! # async fn run() -> Result<(), pubsub_runtime::PubSubError> {
//! let configuration = PubSubConfiguration::new()
//!     .with_provider("InMemory1", ProviderConfig::new(TransportKind::InMemory))
//!     .with_provider("InMemory2", ProviderConfig::new(TransportKind::InMemory));
//!
//! let pubsub = PubSub::builder().configuration(configuration).build().await?;
//! pubsub.producer().publish(&"hello".to_string(), &["InMemory1"]).await?;
//! pubsub.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod binder;
pub mod config;
pub mod container;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod handler;
pub mod message;
pub mod producer;
pub mod provider;
pub mod providers;
pub mod pubsub;
pub mod registry;
pub mod retry;

#[cfg(test)]
mod test_support;

// Used by the `consumer!` macro expansion
#[doc(hidden)]
pub use inventory;

// Re-export commonly used types at crate root for convenience
pub use binder::{Binder, BinderOptions, QueueBinding};
pub use config::{PubSubConfiguration, CONFIG_SECTION, ENV_PREFIX};
pub use container::{HandlerContainer, HandlerResolver};
pub use descriptor::{
    CandidateType, ConsumerCatalog, ConsumerDescriptor, ConsumerOptions, ConsumerScanner,
    InventoryDiscovery, TypeDiscovery,
};
pub use driver::{
    HandlerBinding, ReceivePoint, ReceivePointTarget, TransportCatalog, TransportDriver,
    TransportFactory, DEFAULT_PREFETCH,
};
pub use error::{
    ConfigurationError, DiscoveryError, DispatchError, HandlerResolutionError, PubSubError,
    PublishError, SerializationError, TargetFailure, TransportError, ValidationError,
};
pub use handler::{
    ConsumeContext, Consumer, ConsumerHandler, Delivery, HandlerFactory, HandlerLifetime,
    HandlerType, MessageHandler,
};
pub use message::{Message, MessageId, MessageType, QueueName, Timestamp};
pub use producer::{MessageProducer, Producer, PublishReceipt};
pub use provider::{parse_duration, ProviderConfig, TransportKind};
pub use providers::{DeadLetter, InMemoryDriver, InMemoryTransportFactory};
pub use pubsub::{initialize, PubSub, PubSubBuilder};
pub use registry::{ProviderKey, QueueSystem, QueueSystemRegistry};
pub use retry::{RetryIntervals, RetryState};
