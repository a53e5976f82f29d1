use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::channel::{AckChannel, ChannelFactory};
use crate::error::ChannelError;

/// Top-level configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub consumer: ConsumerTuning,
}

/// Consumer tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerTuning {
    /// Prefix applied when resolving logical queue names, for namespacing
    /// shared brokers.
    pub queue_prefix: String,
    /// Upper bound on a single handler invocation, in milliseconds.
    /// 0 disables the bound.
    pub handler_timeout_ms: u64,
    /// How long `destroy` waits for in-flight dispatches to finalize, in
    /// milliseconds.
    pub drain_timeout_ms: u64,
}

impl Default for ConsumerTuning {
    fn default() -> Self {
        Self {
            queue_prefix: String::new(),
            handler_timeout_ms: 30_000,
            drain_timeout_ms: 30_000,
        }
    }
}

/// Generator for correlation and consumer identifiers. UUIDv7, so ids sort
/// by creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn next_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

/// Process-wide collaborator consumers start against: owns the
/// configuration, the channel factory, and the id generator.
pub struct Context {
    config: ContextConfig,
    channels: Arc<dyn ChannelFactory>,
    ids: IdGenerator,
}

impl Context {
    pub fn new(config: ContextConfig, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            config,
            channels,
            ids: IdGenerator,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn ids(&self) -> IdGenerator {
        self.ids
    }

    /// Apply the configured prefix to a logical queue name.
    pub fn resolve_queue(&self, name: &str) -> String {
        if self.config.consumer.queue_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}", self.config.consumer.queue_prefix, name)
        }
    }

    /// Acquire a broker-operation delegate for a starting consumer.
    pub fn acquire_channel(&self) -> Result<Arc<dyn AckChannel>, ChannelError> {
        self.channels.acquire()
    }
}
