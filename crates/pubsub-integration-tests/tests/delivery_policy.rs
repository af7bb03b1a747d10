//! Integration tests for receive point policies: ephemeral queues, retries,
//! redelivery and dead-lettering.

mod common;

use common::{
    driver_for, eventually, in_memory_configuration, tracked_catalog, ConsumerGroup0,
    DriverHandles, FailingConsumer, TestMessage,
};
use pubsub_runtime::{
    ConsumerCatalog, ConsumerOptions, DeadLetter, HandlerContainer, InMemoryDriver,
    ProviderConfig, PubSub, PubSubConfiguration, TransportKind,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn wait_for_dead_letters(driver: &InMemoryDriver) -> Vec<DeadLetter> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let dead_letters = driver.dead_letters().await;
        if !dead_letters.is_empty() || tokio::time::Instant::now() >= deadline {
            return dead_letters;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Verify that ephemeral mode binds anonymous queues that disappear on shutdown.
#[tokio::test]
async fn test_ephemeral_queues_removed_on_shutdown() {
    // Arrange
    let handles: DriverHandles = Arc::new(Mutex::new(Vec::new()));
    let consumer = ConsumerGroup0::default();
    let mut container = HandlerContainer::new();
    container.singleton(consumer.clone());
    let mut catalog = ConsumerCatalog::new();
    catalog.declare::<ConsumerGroup0>(ConsumerOptions::new().queue_name("durable-name"));

    let pubsub = PubSub::builder()
        .configuration(in_memory_configuration(&["InMemory1"]).with_ephemeral_queues(true))
        .discovery(catalog)
        .resolver(container)
        .catalog(tracked_catalog(handles.clone()))
        .build()
        .await
        .unwrap();
    let driver = driver_for(&handles, "InMemory1");

    // Act
    let names = driver.receive_point_names().await;
    pubsub
        .producer()
        .publish(&TestMessage::new("hello"), &[])
        .await
        .unwrap();

    // Assert
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("ephemeral-"));
    assert!(eventually(|| consumer.count() == 1).await);

    pubsub.shutdown().await;
    assert!(driver.receive_point_names().await.is_empty());
}

/// Verify that a consumer failing every attempt is retried, redelivered and dead-lettered.
#[tokio::test]
async fn test_failing_consumer_dead_lettered() {
    // Arrange
    let handles: DriverHandles = Arc::new(Mutex::new(Vec::new()));
    let consumer = FailingConsumer::default();
    let mut container = HandlerContainer::new();
    container.singleton(consumer.clone());
    let mut catalog = ConsumerCatalog::new();
    catalog.declare::<FailingConsumer>(ConsumerOptions::new().queue_name("fragile"));

    let provider = ProviderConfig::new(TransportKind::InMemory)
        .with_retries(vec![Duration::from_millis(5), Duration::from_millis(5)])
        .with_redeliveries(vec![Duration::from_millis(10)]);

    let pubsub = PubSub::builder()
        .configuration(PubSubConfiguration::new().with_provider("InMemory1", provider))
        .discovery(catalog)
        .resolver(container)
        .catalog(tracked_catalog(handles.clone()))
        .build()
        .await
        .unwrap();

    // Act
    let receipt = pubsub
        .producer()
        .publish(&TestMessage::new("poison"), &[])
        .await
        .unwrap();

    // Assert
    let dead_letters = wait_for_dead_letters(&driver_for(&handles, "InMemory1")).await;
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].message.id, receipt.message_id);
    assert_eq!(dead_letters[0].queue_name, "fragile");
    assert_eq!(dead_letters[0].redelivery_count, 1);
    assert!(dead_letters[0].reason.contains("cannot handle 'poison'"));
    // Three tries per delivery, one delivery plus one redelivery
    assert_eq!(*consumer.attempts.lock().unwrap(), 6);

    pubsub.shutdown().await;
}

/// Verify that a consumer the resolver cannot build is surfaced, not silently dropped.
#[tokio::test]
async fn test_unresolvable_consumer_dead_lettered() {
    // Arrange
    let handles: DriverHandles = Arc::new(Mutex::new(Vec::new()));
    let mut catalog = ConsumerCatalog::new();
    catalog.declare::<ConsumerGroup0>(ConsumerOptions::new());

    let pubsub = PubSub::builder()
        .configuration(in_memory_configuration(&["InMemory1"]))
        .discovery(catalog)
        .resolver(HandlerContainer::new())
        .catalog(tracked_catalog(handles.clone()))
        .build()
        .await
        .unwrap();

    // Act
    pubsub
        .producer()
        .publish(&TestMessage::new("orphan"), &[])
        .await
        .unwrap();

    // Assert
    let dead_letters = wait_for_dead_letters(&driver_for(&handles, "InMemory1")).await;
    assert_eq!(dead_letters.len(), 1);
    assert!(dead_letters[0].reason.starts_with("Fatal:"));
    assert!(dead_letters[0].reason.contains("not registered"));

    pubsub.shutdown().await;
}

/// Verify that a transient consumer gets a fresh instance per dispatch.
#[tokio::test]
async fn test_transient_consumer_constructed_per_dispatch() {
    // Arrange
    let constructed = Arc::new(Mutex::new(0usize));
    let counter = constructed.clone();
    let shared = ConsumerGroup0::default();
    let received = shared.received.clone();

    let mut container = HandlerContainer::new();
    container.transient(move || {
        *counter.lock().unwrap() += 1;
        ConsumerGroup0 {
            received: received.clone(),
        }
    });
    let mut catalog = ConsumerCatalog::new();
    catalog.declare::<ConsumerGroup0>(ConsumerOptions::new());

    let pubsub = PubSub::builder()
        .configuration(in_memory_configuration(&["InMemory1"]))
        .discovery(catalog)
        .resolver(container)
        .build()
        .await
        .unwrap();

    // Act
    for text in ["a", "b", "c"] {
        pubsub
            .producer()
            .publish(&TestMessage::new(text), &[])
            .await
            .unwrap();
    }

    // Assert
    assert!(eventually(|| shared.count() == 3).await);
    assert_eq!(*constructed.lock().unwrap(), 3);

    pubsub.shutdown().await;
}
