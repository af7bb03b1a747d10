//! # PubSub Sandbox
//!
//! Playground host for the routing runtime. Loads layered configuration,
//! declares two heartbeat consumers and publishes a heartbeat on an interval
//! until Ctrl-C or until the requested number of messages was sent.
//!
//! Configuration sources, later ones overriding earlier ones:
//!  1. `config/sandbox.{yaml,json,toml}` relative to the working directory
//!  2. the file passed with `--config`
//!  3. `PUBSUB__*` environment variables (`PUBSUB__PROVIDERS__LOCAL__TYPE=InMemory`)
//!
//! Without any of these a single in-memory provider named `InMemory1` is used.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use pubsub_runtime::{
    ConfigurationError, ConsumeContext, Consumer, ProviderConfig, PubSub, PubSubConfiguration,
    PubSubError, TransportKind,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "pubsub_runtime=info,pubsub_sandbox=info";

/// Provider used when no configuration source defines any
pub const FALLBACK_PROVIDER: &str = "InMemory1";

// ============================================================================
// CLI Structure
// ============================================================================

/// PubSub sandbox - publish heartbeats through every configured queue system
#[derive(Debug, Parser)]
#[command(name = "pubsub-sandbox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish and consume heartbeats through configured queue systems")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PUBSUB_SANDBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Milliseconds between heartbeats
    #[arg(short, long, default_value = "1000")]
    pub interval_ms: u64,

    /// Stop after this many heartbeats
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Provider key to publish to; repeat for several, omit for all
    #[arg(short, long = "provider")]
    pub providers: Vec<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Sandbox errors
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Configuration sources could not be read: {0}")]
    Sources(#[from] config::ConfigError),

    #[error("PubSub error: {0}")]
    PubSub(#[from] PubSubError),

    #[error("Logging initialization failed: {message}")]
    Logging { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Sources(_) => 3,
            Self::PubSub(e) if e.is_startup_fatal() => 4,
            Self::PubSub(_) => 5,
            Self::Logging { .. } => 6,
            Self::Io(_) => 7,
        }
    }
}

// ============================================================================
// Messages and consumers
// ============================================================================

/// Message published by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
}

static CONSUMED: AtomicU64 = AtomicU64::new(0);

/// Number of heartbeats consumed by [`HeartbeatPrinter`] in this process
pub fn consumed() -> u64 {
    CONSUMED.load(Ordering::SeqCst)
}

/// Prints every heartbeat, on every provider
#[derive(Debug, Default)]
pub struct HeartbeatPrinter;

#[async_trait]
impl Consumer for HeartbeatPrinter {
    type Message = Heartbeat;

    async fn consume(&self, ctx: ConsumeContext<Heartbeat>) -> anyhow::Result<()> {
        CONSUMED.fetch_add(1, Ordering::SeqCst);
        let latency = Utc::now() - ctx.message.emitted_at;
        info!(
            provider = %ctx.provider_key,
            queue = %ctx.queue_name,
            sequence = ctx.message.sequence,
            latency_ms = latency.num_milliseconds(),
            "Heartbeat consumed"
        );
        Ok(())
    }
}

pubsub_runtime::consumer!(HeartbeatPrinter, queue_name = "sandbox-heartbeats");

/// Counts heartbeats on the fallback provider only, in transient instances
#[derive(Debug, Default)]
pub struct HeartbeatAuditor;

#[async_trait]
impl Consumer for HeartbeatAuditor {
    type Message = Heartbeat;

    async fn consume(&self, ctx: ConsumeContext<Heartbeat>) -> anyhow::Result<()> {
        if ctx.redelivery_count > 0 {
            info!(
                sequence = ctx.message.sequence,
                redeliveries = ctx.redelivery_count,
                "Audited redelivered heartbeat"
            );
        }
        Ok(())
    }
}

pubsub_runtime::consumer!(
    HeartbeatAuditor,
    provider_key = FALLBACK_PROVIDER,
    queue_name = "sandbox-audit",
    prefetch_count = 4,
    lifetime = pubsub_runtime::HandlerLifetime::Transient,
);

// ============================================================================
// Setup
// ============================================================================

/// Install the global tracing subscriber
pub fn init_tracing(json: bool) -> Result<(), SandboxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| SandboxError::Logging {
        message: e.to_string(),
    })
}

/// Configuration with the single fallback in-memory provider
pub fn fallback_configuration() -> PubSubConfiguration {
    PubSubConfiguration::new()
        .with_provider(FALLBACK_PROVIDER, ProviderConfig::new(TransportKind::InMemory))
}

/// Build the configuration from the layered sources.
///
/// Falls back to [`fallback_configuration`] only when no explicit file was
/// given and no source defines providers.
pub fn load_configuration(explicit: Option<&Path>) -> Result<PubSubConfiguration, SandboxError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/sandbox").required(false));

    if let Some(path) = explicit {
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let layered = builder
        .add_source(PubSubConfiguration::environment_source())
        .build()?;

    match PubSubConfiguration::from_config(&layered) {
        Ok(configuration) => Ok(configuration),
        Err(ConfigurationError::MissingProviders { .. }) if explicit.is_none() => {
            info!(provider = FALLBACK_PROVIDER, "No providers configured; using in-memory fallback");
            Ok(fallback_configuration())
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Run loop
// ============================================================================

/// What a sandbox run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub published: u64,
    pub failed: u64,
}

/// Start the queue systems and publish until Ctrl-C or `cli.count` heartbeats
pub async fn run(cli: &Cli) -> Result<RunSummary, SandboxError> {
    let configuration = load_configuration(cli.config.as_deref())?;
    let pubsub = PubSub::builder().configuration(configuration).build().await?;

    let keys: Vec<&str> = cli.providers.iter().map(String::as_str).collect();
    let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval_ms.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut summary = RunSummary {
        published: 0,
        failed: 0,
    };
    let mut sequence = 0u64;

    while cli.count.map_or(true, |count| sequence < count) {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                info!("Ctrl-C received, stopping");
                break;
            }
            _ = ticker.tick() => {
                let heartbeat = Heartbeat {
                    sequence,
                    emitted_at: Utc::now(),
                };
                match pubsub.producer().publish(&heartbeat, &keys).await {
                    Ok(receipt) => {
                        summary.published += 1;
                        info!(
                            sequence,
                            message_id = %receipt.message_id,
                            providers = receipt.accepted_by.len(),
                            "Heartbeat published"
                        );
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!(sequence, error = %e, "Heartbeat publish failed");
                    }
                }
                sequence += 1;
            }
        }
    }

    // Let in-flight dispatches finish before the workers stop.
    tokio::time::sleep(Duration::from_millis(cli.interval_ms.clamp(50, 500))).await;
    pubsub.shutdown().await;

    info!(
        published = summary.published,
        failed = summary.failed,
        consumed = consumed(),
        "Sandbox stopped"
    );
    Ok(summary)
}
