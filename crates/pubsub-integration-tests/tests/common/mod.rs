//! Common test utilities for pubsub-runtime integration tests
//!
//! This module provides:
//! - A test message and recording consumers, one type per consumer group
//! - Helpers building in-memory configurations and catalogs that keep driver handles
//! - A transport driver that is never reachable

use async_trait::async_trait;
use pubsub_runtime::{
    ConfigurationError, ConsumeContext, Consumer, InMemoryDriver, Message, ProviderConfig,
    PubSubConfiguration, ReceivePoint, TransportCatalog, TransportDriver, TransportError,
    TransportKind,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Messages and consumers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMessage {
    pub message: String,
}

impl TestMessage {
    #[allow(dead_code)]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Declares a consumer type recording the text of every message it receives
macro_rules! recording_consumer {
    ($name:ident) => {
        #[derive(Clone, Default)]
        #[allow(dead_code)]
        pub struct $name {
            pub received: Arc<Mutex<Vec<String>>>,
        }

        #[allow(dead_code)]
        impl $name {
            pub fn count(&self) -> usize {
                self.received.lock().unwrap().len()
            }
        }

        #[async_trait]
        impl Consumer for $name {
            type Message = TestMessage;

            async fn consume(&self, ctx: ConsumeContext<TestMessage>) -> anyhow::Result<()> {
                self.received.lock().unwrap().push(ctx.message.message);
                Ok(())
            }
        }
    };
}

recording_consumer!(ConsumerGroup0);
recording_consumer!(ConsumerGroup1);
recording_consumer!(ConsumerGroup2);

/// Fails every attempt
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct FailingConsumer {
    pub attempts: Arc<Mutex<usize>>,
}

#[async_trait]
impl Consumer for FailingConsumer {
    type Message = TestMessage;

    async fn consume(&self, ctx: ConsumeContext<TestMessage>) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        anyhow::bail!("cannot handle '{}'", ctx.message.message)
    }
}

// ============================================================================
// Configuration and catalogs
// ============================================================================

/// Configuration with one in-memory provider per key
#[allow(dead_code)]
pub fn in_memory_configuration(keys: &[&str]) -> PubSubConfiguration {
    keys.iter().fold(PubSubConfiguration::new(), |configuration, key| {
        configuration.with_provider(*key, ProviderConfig::new(TransportKind::InMemory))
    })
}

/// Handles to every in-memory driver a [`tracked_catalog`] built
pub type DriverHandles = Arc<Mutex<Vec<InMemoryDriver>>>;

/// Catalog building in-memory drivers while keeping a handle to each
#[allow(dead_code)]
pub fn tracked_catalog(handles: DriverHandles) -> TransportCatalog {
    let mut catalog = TransportCatalog::empty();
    catalog.register(
        TransportKind::InMemory,
        move |config: &ProviderConfig| -> Result<Box<dyn TransportDriver>, ConfigurationError> {
            let driver = InMemoryDriver::new(config.key.clone());
            handles.lock().unwrap().push(driver.clone());
            Ok(Box::new(driver))
        },
    );
    catalog
}

#[allow(dead_code)]
pub fn driver_for(handles: &DriverHandles, key: &str) -> InMemoryDriver {
    handles
        .lock()
        .unwrap()
        .iter()
        .find(|d| d.provider_key() == key)
        .cloned()
        .unwrap_or_else(|| panic!("no driver built for '{}'", key))
}

// ============================================================================
// Unreachable transport
// ============================================================================

/// Transport whose broker can never be reached; start succeeds, publish fails
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct UnreachableDriver;

#[async_trait]
impl TransportDriver for UnreachableDriver {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::Custom
    }

    async fn register_receive_point(&self, _receive_point: ReceivePoint) -> Result<(), TransportError> {
        Ok(())
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        Ok(())
    }

    async fn publish(&self, _message: Message, _cancel: &CancellationToken) -> Result<(), TransportError> {
        Err(TransportError::ConnectionFailed {
            message: "broker unreachable".to_string(),
        })
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ============================================================================
// Waiting
// ============================================================================

/// Poll `condition` for up to two seconds
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Give stray deliveries time to arrive before asserting nothing changed
#[allow(dead_code)]
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}
