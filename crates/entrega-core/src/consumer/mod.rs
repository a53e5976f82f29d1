use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::channel::AckChannel;
use crate::codec::{JsonCodec, MessageCodec};
use crate::context::{Context, IdGenerator};
use crate::error::{BoxError, DispatchError, StartError};
use crate::extract::Extractor;
use crate::gate::AckMode;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::reply::ReplyProducer;

mod dispatch;
mod timeout;

/// Business logic invoked once per delivery.
///
/// The handler may decide the message's gate (ack or nack); whatever it
/// leaves undecided is requeued by the dispatcher once the invocation
/// returns. Returning an error routes the message through the consumer's
/// error hook before that happens.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), BoxError>;
}

/// Receives every dispatch failure, for custom telemetry or acknowledgment
/// policy. The hook may itself decide the message's gate; the dispatcher's
/// safety net only fires for gates still undecided afterwards.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn on_error(&self, message: &Message, error: &DispatchError);
}

/// Broker lifecycle notifications. Every method has an empty default; the
/// consumer logs each event before forwarding it here.
pub trait LifecycleHooks: Send + Sync {
    /// The broker confirmed the consumer registration.
    fn consume_ok(&self, _consumer_tag: &str) {}

    /// The broker confirmed a consumer-initiated cancel.
    fn cancel_ok(&self, _consumer_tag: &str) {}

    /// The broker cancelled the consumer unilaterally (queue deleted,
    /// server-side policy).
    fn cancel(&self, _consumer_tag: &str) {}

    /// The underlying connection or channel is shutting down.
    fn shutdown(&self, _consumer_tag: &str, _reason: &str) {}

    /// The broker confirmed a recover request; unacknowledged deliveries
    /// will be redelivered.
    fn recover_ok(&self, _consumer_tag: &str) {}
}

/// Builder for a [`Consumer`]. Configuration freezes when `start` succeeds;
/// a started consumer cannot be reconfigured.
pub struct ConsumerBuilder {
    queue: String,
    ack_mode: AckMode,
    codec: Arc<dyn MessageCodec>,
    extractors: Vec<Arc<dyn Extractor>>,
    error_hook: Option<Arc<dyn ErrorHook>>,
    lifecycle: Option<Arc<dyn LifecycleHooks>>,
    reply: Option<Arc<dyn ReplyProducer>>,
    handler: Option<Arc<dyn Handler>>,
    handler_timeout: Option<Option<Duration>>,
}

impl ConsumerBuilder {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ack_mode: AckMode::Manual,
            codec: Arc::new(JsonCodec),
            extractors: Vec::new(),
            error_hook: None,
            lifecycle: None,
            reply: None,
            handler: None,
            handler_timeout: None,
        }
    }

    /// Register the business handler. Required.
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn ack_mode(mut self, mode: AckMode) -> Self {
        self.ack_mode = mode;
        self
    }

    /// Replace the default JSON codec.
    pub fn codec(mut self, codec: impl MessageCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Append a pre-handler extractor. Registration order is execution
    /// order.
    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractors.push(Arc::new(extractor));
        self
    }

    pub fn error_hook(mut self, hook: impl ErrorHook + 'static) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    pub fn lifecycle(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.lifecycle = Some(Arc::new(hooks));
        self
    }

    /// Attach a reply producer for RPC-style handlers.
    pub fn reply_producer(mut self, reply: impl ReplyProducer + 'static) -> Self {
        self.reply = Some(Arc::new(reply));
        self
    }

    /// Override the context-configured handler bound for this consumer.
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(Some(timeout));
        self
    }

    /// Remove the handler bound entirely for this consumer.
    pub fn no_handler_timeout(mut self) -> Self {
        self.handler_timeout = Some(None);
        self
    }

    /// Freeze the configuration and acquire broker resources: the channel
    /// delegate from the context's factory and the id generator. Fails when
    /// no handler is registered or the factory cannot yield a channel.
    pub fn start(self, context: &Context) -> Result<Consumer, StartError> {
        let handler = self
            .handler
            .ok_or_else(|| StartError::MissingHandler(self.queue.clone()))?;

        let queue = context.resolve_queue(&self.queue);
        let channel = context.acquire_channel()?;
        let tuning = &context.config().consumer;

        let handler_timeout = match self.handler_timeout {
            Some(override_value) => override_value,
            None => match tuning.handler_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        };

        info!(
            %queue,
            ack_mode = ?self.ack_mode,
            extractors = self.extractors.len(),
            "consumer started"
        );

        Ok(Consumer {
            queue,
            ack_mode: self.ack_mode,
            codec: self.codec,
            extractors: self.extractors,
            error_hook: self.error_hook,
            lifecycle: self.lifecycle,
            reply: self.reply,
            handler,
            handler_timeout,
            drain_timeout: Duration::from_millis(tuning.drain_timeout_ms),
            channel,
            ids: context.ids(),
            metrics: Metrics::new(),
            inflight: AtomicUsize::new(0),
            drained: Notify::new(),
            shutting_down: AtomicBool::new(false),
        })
    }
}

/// A started consumer: frozen configuration plus the lifecycle state the
/// dispatcher needs (in-flight count, draining flag).
///
/// Deliveries enter through [`Consumer::handle_delivery`]; broker lifecycle
/// events through the `handle_*` callbacks. Shared across delivery tasks as
/// `Arc<Consumer>`.
pub struct Consumer {
    queue: String,
    ack_mode: AckMode,
    codec: Arc<dyn MessageCodec>,
    extractors: Vec<Arc<dyn Extractor>>,
    error_hook: Option<Arc<dyn ErrorHook>>,
    lifecycle: Option<Arc<dyn LifecycleHooks>>,
    reply: Option<Arc<dyn ReplyProducer>>,
    handler: Arc<dyn Handler>,
    handler_timeout: Option<Duration>,
    drain_timeout: Duration,
    channel: Arc<dyn AckChannel>,
    ids: IdGenerator,
    metrics: Metrics,
    inflight: AtomicUsize,
    drained: Notify,
    shutting_down: AtomicBool,
}

impl Consumer {
    pub fn builder(queue: impl Into<String>) -> ConsumerBuilder {
        ConsumerBuilder::new(queue)
    }

    /// The resolved queue this consumer reads from.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    /// Reply handle for RPC-style consumers, when configured.
    pub fn reply_producer(&self) -> Option<&Arc<dyn ReplyProducer>> {
        self.reply.as_ref()
    }

    pub fn ids(&self) -> IdGenerator {
        self.ids
    }

    /// Deliveries currently between receipt and finalization.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    // --- broker lifecycle callbacks ---

    pub fn handle_consume_ok(&self, consumer_tag: &str) {
        debug!(queue = %self.queue, %consumer_tag, "consume-ok");
        if let Some(hooks) = &self.lifecycle {
            hooks.consume_ok(consumer_tag);
        }
    }

    pub fn handle_cancel_ok(&self, consumer_tag: &str) {
        info!(queue = %self.queue, %consumer_tag, "cancel-ok");
        if let Some(hooks) = &self.lifecycle {
            hooks.cancel_ok(consumer_tag);
        }
    }

    /// Broker-initiated cancel. The consumer stops accepting deliveries; the
    /// broker requeues whatever was unacknowledged on its side.
    pub fn handle_cancel(&self, consumer_tag: &str) {
        warn!(queue = %self.queue, %consumer_tag, "consumer cancelled by broker");
        self.shutting_down.store(true, Ordering::Release);
        if let Some(hooks) = &self.lifecycle {
            hooks.cancel(consumer_tag);
        }
    }

    /// Connection or channel shutdown. New deliveries are refused with a
    /// requeueing nack; in-flight dispatches keep running toward their
    /// terminal decision.
    pub fn handle_shutdown(&self, consumer_tag: &str, reason: &str) {
        info!(queue = %self.queue, %consumer_tag, %reason, "shutdown signal");
        self.shutting_down.store(true, Ordering::Release);
        if let Some(hooks) = &self.lifecycle {
            hooks.shutdown(consumer_tag, reason);
        }
    }

    pub fn handle_recover_ok(&self, consumer_tag: &str) {
        info!(queue = %self.queue, %consumer_tag, "recover-ok");
        if let Some(hooks) = &self.lifecycle {
            hooks.recover_ok(consumer_tag);
        }
    }

    /// Stop accepting new deliveries and wait until in-flight dispatches
    /// reach their terminal decision, bounded by the configured drain
    /// timeout.
    ///
    /// Releases no broker resource itself: channel handles are
    /// reference-counted and dropped with the consumer.
    pub async fn destroy(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let pending = self.inflight();
        if pending > 0 {
            debug!(queue = %self.queue, pending, "draining in-flight deliveries");
        }

        let drained = async {
            loop {
                // Arm the waiter before checking the count, otherwise a
                // guard dropping in between would be missed.
                let notified = self.drained.notified();
                if self.inflight.load(Ordering::Acquire) == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(self.drain_timeout, drained).await.is_err() {
            warn!(
                queue = %self.queue,
                inflight = self.inflight(),
                "drain timeout expired with deliveries still in flight"
            );
        } else {
            info!(queue = %self.queue, "consumer drained");
        }
    }

    fn track_inflight(&self) -> InflightGuard<'_> {
        let current = self.inflight.fetch_add(1, Ordering::AcqRel) + 1;
        self.metrics.set_inflight(&self.queue, current as u64);
        InflightGuard { consumer: self }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue)
            .field("ack_mode", &self.ack_mode)
            .field("extractors", &self.extractors.len())
            .field("handler_timeout", &self.handler_timeout)
            .field("inflight", &self.inflight())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

/// Keeps the in-flight count accurate for the lifetime of one dispatch,
/// panics included.
struct InflightGuard<'a> {
    consumer: &'a Consumer,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.consumer.inflight.fetch_sub(1, Ordering::AcqRel) - 1;
        self.consumer
            .metrics
            .set_inflight(&self.consumer.queue, remaining as u64);
        if remaining == 0 {
            self.consumer.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests;
