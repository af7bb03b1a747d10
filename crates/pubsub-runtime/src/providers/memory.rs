//! In-memory transport driver for testing and development.
//!
//! This driver simulates a broker entirely within the process:
//! - Every published message is delivered once to every matching handler on
//!   every receive point
//! - Each receive point has its own worker task, with concurrent dispatches
//!   bounded by the receive point's prefetch
//! - Failed dispatches go through local retry, then redelivery, then an
//!   in-memory dead letter list
//!
//! It is the reference for how other drivers are expected to behave.

use crate::driver::{
    HandlerBinding, ReceivePoint, ReceivePointTarget, TransportDriver, TransportFactory,
    DEFAULT_PREFETCH,
};
use crate::error::{ConfigurationError, DispatchError, TransportError};
use crate::handler::{Delivery, HandlerType};
use crate::message::Message;
use crate::provider::{ProviderConfig, TransportKind};
use crate::retry::{RetryIntervals, RetryState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message queued for one handler on one receive point
struct Envelope {
    message: Message,
    handler_index: usize,
    redelivery_count: u32,
}

/// Immutable receive point data shared by its worker and dispatch tasks
struct ReceivePointState {
    name: String,
    ephemeral: bool,
    prefetch: u32,
    retry: RetryIntervals,
    redelivery: RetryIntervals,
    handlers: Vec<HandlerBinding>,
    sender: mpsc::UnboundedSender<Envelope>,
}

struct DriverState {
    started: bool,
    stopped: bool,
    shutdown: CancellationToken,
    receive_points: Vec<Arc<ReceivePointState>>,
    /// Receivers waiting for `start` to hand them to a worker
    pending: Vec<(Arc<ReceivePointState>, mpsc::UnboundedReceiver<Envelope>)>,
    workers: Vec<JoinHandle<()>>,
}

struct DriverInner {
    provider_key: String,
    state: RwLock<DriverState>,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

/// A message that exhausted local retries and redeliveries
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: Message,
    pub queue_name: String,
    pub handler_type: HandlerType,
    pub redelivery_count: u32,
    pub reason: String,
}

// ============================================================================
// InMemoryDriver
// ============================================================================

/// In-memory transport driver
///
/// Cloning yields another handle to the same driver, which lets tests keep a
/// handle for inspection after the driver is handed to a registry.
#[derive(Clone)]
pub struct InMemoryDriver {
    inner: Arc<DriverInner>,
}

impl InMemoryDriver {
    /// Create a new driver for the given provider key
    pub fn new(provider_key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                provider_key: provider_key.into(),
                state: RwLock::new(DriverState {
                    started: false,
                    stopped: false,
                    shutdown: CancellationToken::new(),
                    receive_points: Vec::new(),
                    pending: Vec::new(),
                    workers: Vec::new(),
                }),
                dead_letters: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn provider_key(&self) -> &str {
        &self.inner.provider_key
    }

    pub async fn is_started(&self) -> bool {
        let state = self.inner.state.read().await;
        state.started && !state.stopped
    }

    /// Names of the currently registered receive points
    pub async fn receive_point_names(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        state
            .receive_points
            .iter()
            .map(|point| point.name.clone())
            .collect()
    }

    /// Messages that could not be delivered
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.lock().await.clone()
    }
}

#[async_trait]
impl TransportDriver for InMemoryDriver {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::InMemory
    }

    async fn register_receive_point(
        &self,
        receive_point: ReceivePoint,
    ) -> Result<(), TransportError> {
        let mut state = self.inner.state.write().await;
        if state.started {
            return Err(TransportError::AlreadyStarted);
        }

        let (name, ephemeral) = match &receive_point.target {
            ReceivePointTarget::Named(queue) => (queue.as_str().to_string(), false),
            ReceivePointTarget::Ephemeral => (format!("ephemeral-{}", uuid::Uuid::new_v4()), true),
        };

        if state.receive_points.iter().any(|point| point.name == name) {
            return Err(TransportError::DuplicateReceivePoint { name });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let point = Arc::new(ReceivePointState {
            name,
            ephemeral,
            prefetch: receive_point.effective_prefetch(DEFAULT_PREFETCH),
            retry: receive_point.retry,
            redelivery: receive_point.redelivery,
            handlers: receive_point.handlers,
            sender,
        });

        debug!(
            provider = %self.inner.provider_key,
            queue = %point.name,
            handlers = point.handlers.len(),
            prefetch = point.prefetch,
            "Registered receive point"
        );

        state.receive_points.push(point.clone());
        state.pending.push((point, receiver));
        Ok(())
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut state = self.inner.state.write().await;
        if state.started {
            return Err(TransportError::AlreadyStarted);
        }
        state.started = true;
        state.shutdown = cancel.child_token();

        let pending = std::mem::take(&mut state.pending);
        for (point, receiver) in pending {
            let worker = tokio::spawn(run_receive_point(
                self.inner.clone(),
                point,
                receiver,
                state.shutdown.clone(),
            ));
            state.workers.push(worker);
        }

        info!(
            provider = %self.inner.provider_key,
            receive_points = state.receive_points.len(),
            "In-memory transport started"
        );
        Ok(())
    }

    async fn publish(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let state = self.inner.state.read().await;
        if !state.started || state.stopped {
            return Err(TransportError::NotStarted);
        }

        let mut deliveries = 0usize;
        for point in &state.receive_points {
            for (handler_index, binding) in point.handlers.iter().enumerate() {
                if binding.message_type != message.message_type {
                    continue;
                }

                let envelope = Envelope {
                    message: message.clone(),
                    handler_index,
                    redelivery_count: 0,
                };
                if point.sender.send(envelope).is_ok() {
                    deliveries += 1;
                }
            }
        }

        debug!(
            provider = %self.inner.provider_key,
            message_id = %message.id,
            message_type = %message.message_type,
            deliveries,
            "Published message"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let workers = {
            let mut state = self.inner.state.write().await;
            if state.stopped {
                return Ok(());
            }
            state.stopped = true;
            state.shutdown.cancel();
            state.receive_points.retain(|point| !point.ephemeral);
            std::mem::take(&mut state.workers)
        };

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(provider = %self.inner.provider_key, error = %e, "Receive point worker ended abnormally");
            }
        }

        info!(provider = %self.inner.provider_key, "In-memory transport stopped");
        Ok(())
    }
}

/// Builds an [`InMemoryDriver`] per provider entry
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryTransportFactory;

impl TransportFactory for InMemoryTransportFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn TransportDriver>, ConfigurationError> {
        Ok(Box::new(InMemoryDriver::new(config.key.clone())))
    }
}

// ============================================================================
// Dispatch
// ============================================================================

async fn run_receive_point(
    inner: Arc<DriverInner>,
    point: Arc<ReceivePointState>,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    shutdown: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(point.prefetch as usize));

    loop {
        let envelope = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let inner = inner.clone();
        let point = point.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _permit = permit;
            dispatch(&inner, &point, envelope, shutdown).await;
        });
    }

    debug!(provider = %inner.provider_key, queue = %point.name, "Receive point worker stopped");
}

/// Deliver one envelope, applying local retry, then redelivery, then dead-lettering
async fn dispatch(
    inner: &Arc<DriverInner>,
    point: &Arc<ReceivePointState>,
    envelope: Envelope,
    shutdown: CancellationToken,
) {
    let Some(binding) = point.handlers.get(envelope.handler_index) else {
        return;
    };

    let mut retry = RetryState::new();
    let last_error = loop {
        let delivery = Delivery {
            message: envelope.message.clone(),
            provider_key: inner.provider_key.clone(),
            queue_name: point.name.clone(),
            attempt: retry.attempt,
            redelivery_count: envelope.redelivery_count,
            cancellation: shutdown.clone(),
        };

        let error = match invoke(binding, &delivery).await {
            Ok(()) => return,
            Err(error) => error,
        };

        if error.is_fatal() {
            error!(
                provider = %inner.provider_key,
                queue = %point.name,
                handler = %binding.handler_type,
                message_id = %envelope.message.id,
                error = %error,
                "Handler resolution failed"
            );
        } else {
            warn!(
                provider = %inner.provider_key,
                queue = %point.name,
                handler = %binding.handler_type,
                message_id = %envelope.message.id,
                attempt = retry.attempt,
                error = %error,
                "Dispatch failed"
            );
        }

        if matches!(error, DispatchError::Cancelled) {
            return;
        }

        match retry.get_delay(&point.retry) {
            Some(delay) => {
                if !sleep_unless_cancelled(delay, &shutdown).await {
                    return;
                }
                retry.next_attempt();
            }
            None => break error,
        }
    };

    if let Some(delay) = point.redelivery.delay_for(envelope.redelivery_count) {
        let sender = point.sender.clone();
        let redelivered = Envelope {
            redelivery_count: envelope.redelivery_count + 1,
            ..envelope
        };
        debug!(
            queue = %point.name,
            message_id = %redelivered.message.id,
            redelivery = redelivered.redelivery_count,
            ?delay,
            "Scheduling redelivery"
        );
        tokio::spawn(async move {
            if sleep_unless_cancelled(delay, &shutdown).await && sender.send(redelivered).is_err() {
                debug!("Receive point closed before redelivery");
            }
        });
        return;
    }

    error!(
        provider = %inner.provider_key,
        queue = %point.name,
        handler = %binding.handler_type,
        message_id = %envelope.message.id,
        redeliveries = envelope.redelivery_count,
        error = %last_error,
        "Message moved to dead letters"
    );
    inner.dead_letters.lock().await.push(DeadLetter {
        message: envelope.message,
        queue_name: point.name.clone(),
        handler_type: binding.handler_type.clone(),
        redelivery_count: envelope.redelivery_count,
        reason: last_error.to_string(),
    });
}

async fn invoke(binding: &HandlerBinding, delivery: &Delivery) -> Result<(), DispatchError> {
    let handler = (binding.factory)()?;
    handler.handle(delivery).await
}

/// Returns `false` if the shutdown token fired first
async fn sleep_unless_cancelled(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
