//! Shared mocks for unit tests.

use crate::driver::{ReceivePoint, TransportDriver};
use crate::error::TransportError;
use crate::handler::{ConsumeContext, Consumer};
use crate::message::Message;
use crate::provider::TransportKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Messages and consumers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub sequence: u32,
}

/// Counts every consumed message
#[derive(Clone, Default)]
pub struct CountingConsumer {
    pub count: Arc<AtomicUsize>,
}

#[async_trait]
impl Consumer for CountingConsumer {
    type Message = Ping;

    async fn consume(&self, _context: ConsumeContext<Ping>) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Second consumer type for grouping tests
#[derive(Clone, Default)]
pub struct AuditConsumer {
    pub count: Arc<AtomicUsize>,
}

#[async_trait]
impl Consumer for AuditConsumer {
    type Message = Ping;

    async fn consume(&self, _context: ConsumeContext<Ping>) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Generic handler whose type name contains a space
pub struct PairConsumer<A, B>(std::marker::PhantomData<(A, B)>);

#[async_trait]
impl<A, B> Consumer for PairConsumer<A, B>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    type Message = Ping;

    async fn consume(&self, _context: ConsumeContext<Ping>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails the first `failures` attempts, then succeeds
#[derive(Clone, Default)]
pub struct FlakyConsumer {
    pub attempts: Arc<AtomicUsize>,
    pub failures: usize,
}

#[async_trait]
impl Consumer for FlakyConsumer {
    type Message = Ping;

    async fn consume(&self, _context: ConsumeContext<Ping>) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            anyhow::bail!("attempt {} failed", attempt);
        }
        Ok(())
    }
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

// ============================================================================
// Recording driver
// ============================================================================

#[derive(Default)]
pub struct RecordedCalls {
    pub receive_points: Vec<ReceivePoint>,
    pub starts: usize,
    pub stops: usize,
    pub published: Vec<Message>,
}

/// Driver recording every call, optionally failing start or publish
#[derive(Clone)]
pub struct RecordingDriver {
    name: String,
    calls: Arc<Mutex<RecordedCalls>>,
    events: Arc<Mutex<Vec<String>>>,
    fail_start: bool,
    fail_publish: bool,
}

impl RecordingDriver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(Mutex::new(RecordedCalls::default())),
            events: Arc::new(Mutex::new(Vec::new())),
            fail_start: false,
            fail_publish: false,
        }
    }

    /// Share an event log across several drivers
    pub fn with_events(mut self, events: Arc<Mutex<Vec<String>>>) -> Self {
        self.events = events;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    pub fn boxed(&self) -> Box<dyn TransportDriver> {
        Box::new(self.clone())
    }

    pub fn published_count(&self) -> usize {
        self.calls.lock().unwrap().published.len()
    }

    pub fn receive_points(&self) -> Vec<ReceivePoint> {
        self.calls.lock().unwrap().receive_points.clone()
    }

    pub fn starts(&self) -> usize {
        self.calls.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.calls.lock().unwrap().stops
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportDriver for RecordingDriver {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::Custom
    }

    async fn register_receive_point(
        &self,
        receive_point: ReceivePoint,
    ) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(format!("bind:{}", self.name));
        self.calls.lock().unwrap().receive_points.push(receive_point);
        Ok(())
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(format!("start:{}", self.name));
        self.calls.lock().unwrap().starts += 1;
        if self.fail_start {
            return Err(TransportError::ConnectionFailed {
                message: format!("{} unreachable", self.name),
            });
        }
        Ok(())
    }

    async fn publish(
        &self,
        message: Message,
        _cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        self.events.lock().unwrap().push(format!("publish:{}", self.name));
        if self.fail_publish {
            return Err(TransportError::ConnectionFailed {
                message: format!("{} unreachable", self.name),
            });
        }
        self.calls.lock().unwrap().published.push(message);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.calls.lock().unwrap().stops += 1;
        Ok(())
    }
}
