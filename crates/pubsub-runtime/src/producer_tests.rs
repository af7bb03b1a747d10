//! Tests for fan-out publishing.

use super::*;
use crate::provider::TransportKind;
use crate::test_support::{Ping, RecordingDriver};
use std::sync::Mutex;

struct Fixture {
    producer: Producer,
    drivers: Vec<RecordingDriver>,
    events: Arc<Mutex<Vec<String>>>,
}

fn fixture(drivers: Vec<(&str, RecordingDriver)>) -> Fixture {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut registry = QueueSystemRegistry::new();
    let mut kept = Vec::new();
    for (key, driver) in drivers {
        let driver = driver.with_events(events.clone());
        registry
            .register(key, TransportKind::Custom, driver.boxed())
            .unwrap();
        kept.push(driver);
    }
    Fixture {
        producer: Producer::new(Arc::new(registry)),
        drivers: kept,
        events,
    }
}

fn healthy(keys: &[&'static str]) -> Fixture {
    fixture(keys.iter().map(|k| (*k, RecordingDriver::new(k))).collect())
}

fn counts(fixture: &Fixture) -> Vec<usize> {
    fixture.drivers.iter().map(|d| d.published_count()).collect()
}

mod fan_out_tests {
    use super::*;

    /// Verify that empty keys publish once to every provider.
    #[tokio::test]
    async fn test_empty_keys_publish_everywhere() {
        let fixture = healthy(&["P0", "P1", "P2"]);

        let receipt = fixture.producer.publish(&Ping { sequence: 1 }, &[]).await.unwrap();

        assert_eq!(counts(&fixture), vec![1, 1, 1]);
        let accepted: Vec<_> = receipt.accepted_by.iter().map(|k| k.to_string()).collect();
        assert_eq!(accepted, vec!["P0", "P1", "P2"]);
    }

    /// Verify that explicit keys publish only to the matching providers.
    #[tokio::test]
    async fn test_keys_select_subset() {
        let fixture = healthy(&["P0", "P1", "P2"]);

        fixture.producer.publish(&Ping { sequence: 1 }, &["p2"]).await.unwrap();
        fixture.producer.publish(&Ping { sequence: 2 }, &["P0", "P2"]).await.unwrap();

        assert_eq!(counts(&fixture), vec![1, 0, 2]);
    }

    /// Verify that unknown keys are skipped while another key matches.
    #[tokio::test]
    async fn test_unknown_key_skipped() {
        let fixture = healthy(&["P0", "P1"]);

        let receipt = fixture
            .producer
            .publish(&Ping { sequence: 1 }, &["NotExists", "P1"])
            .await
            .unwrap();

        assert_eq!(counts(&fixture), vec![0, 1]);
        assert_eq!(receipt.accepted_by.len(), 1);
    }

    /// Verify that the receipt carries the id of the published message.
    #[tokio::test]
    async fn test_receipt_message_id() {
        let fixture = healthy(&["P0"]);
        let message = Message::from_payload(&Ping { sequence: 7 }).unwrap();
        let id = message.id.clone();

        let receipt = fixture
            .producer
            .publish_message(message, &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(receipt.message_id, id);
        let published = &fixture.drivers[0];
        assert_eq!(published.published_count(), 1);
    }
}

mod failure_tests {
    use super::*;

    /// Verify that no provider is attempted when no key matches.
    #[tokio::test]
    async fn test_no_match_attempts_nothing() {
        let fixture = healthy(&["P0", "P1"]);

        let result = fixture.producer.publish(&Ping { sequence: 1 }, &["NotExists"]).await;

        assert!(matches!(result, Err(PubSubError::NoMatchingProvider { .. })));
        assert!(fixture.events.lock().unwrap().is_empty());
    }

    /// Verify that one failing target does not prevent the others and is reported.
    #[tokio::test]
    async fn test_partial_failure_aggregated() {
        let fixture = fixture(vec![
            ("P0", RecordingDriver::new("P0")),
            ("P1", RecordingDriver::new("P1").failing_publish()),
            ("P2", RecordingDriver::new("P2")),
        ]);

        let result = fixture.producer.publish(&Ping { sequence: 1 }, &[]).await;

        // Every target was attempted exactly once.
        let mut events = fixture.events.lock().unwrap().clone();
        events.sort();
        assert_eq!(events, vec!["publish:P0", "publish:P1", "publish:P2"]);
        assert_eq!(counts(&fixture), vec![1, 0, 1]);

        match result {
            Err(PubSubError::Publish(e)) => {
                assert_eq!(e.failures().len(), 1);
                assert_eq!(e.first_failure().provider.as_str(), "P1");
                let succeeded: Vec<_> = e.succeeded().iter().map(|k| k.to_string()).collect();
                assert_eq!(succeeded, vec!["P0", "P2"]);
                assert!(e.is_transient());
            }
            other => panic!("expected Publish error, got {:?}", other),
        }
    }

    /// Verify that every failure is listed when all targets fail.
    #[tokio::test]
    async fn test_all_targets_fail() {
        let fixture = fixture(vec![
            ("P0", RecordingDriver::new("P0").failing_publish()),
            ("P1", RecordingDriver::new("P1").failing_publish()),
        ]);

        let result = fixture.producer.publish(&Ping { sequence: 1 }, &[]).await;

        match result {
            Err(PubSubError::Publish(e)) => {
                assert_eq!(e.failures().len(), 2);
                assert!(e.succeeded().is_empty());
                assert!(e.to_string().contains("2 of 2"));
            }
            other => panic!("expected Publish error, got {:?}", other),
        }
    }
}
