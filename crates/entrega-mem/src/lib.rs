//! In-memory broker adapter for the entrega pipeline.
//!
//! Implements the channel seam over process-local queues so consumers can be
//! exercised without a running broker: tests and examples publish messages,
//! fetch tagged deliveries, and inspect acknowledgment outcomes directly.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use entrega_core::channel::{AckChannel, ChannelFactory};
use entrega_core::error::ChannelError;
use entrega_core::message::{DeliveryInfo, Properties, RawDelivery};

/// A published message waiting for delivery.
#[derive(Debug, Clone)]
struct Queued {
    props: Properties,
    body: Vec<u8>,
    redelivered: bool,
}

/// One delivery awaiting its acknowledgment.
struct Inflight {
    queue: String,
    message: Queued,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Queued>>,
    inflight: HashMap<u64, Inflight>,
    next_tag: u64,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    closed: bool,
}

impl BrokerState {
    /// The in-flight tags covered by one call: just `delivery_tag`, or every
    /// tag up to and including it when `multiple` is set.
    fn covered_tags(&self, delivery_tag: u64, multiple: bool) -> Vec<u64> {
        if multiple {
            let mut tags: Vec<u64> = self
                .inflight
                .keys()
                .copied()
                .filter(|tag| *tag <= delivery_tag)
                .collect();
            tags.sort_unstable();
            tags
        } else {
            vec![delivery_tag]
        }
    }
}

/// Process-local broker: named FIFO queues, tagged deliveries, requeue on
/// negative acknowledgment. State is shared with the channels it hands out,
/// so clones observe the same queues.
#[derive(Clone, Default)]
pub struct MemBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a message onto a queue.
    pub fn publish(&self, queue: &str, props: Properties, body: Vec<u8>) {
        let mut state = self.state.lock();
        state.queues.entry(queue.to_string()).or_default().push_back(Queued {
            props,
            body,
            redelivered: false,
        });
    }

    /// Pop the next message off `queue` as a tagged delivery. The message
    /// stays in flight until its tag is acked or nacked.
    pub fn fetch(&self, queue: &str, consumer_tag: &str) -> Option<RawDelivery> {
        let mut state = self.state.lock();
        let message = state.queues.get_mut(queue)?.pop_front()?;
        state.next_tag += 1;
        let tag = state.next_tag;
        let raw = RawDelivery {
            consumer_tag: consumer_tag.to_string(),
            info: DeliveryInfo {
                delivery_tag: tag,
                exchange: String::new(),
                routing_key: queue.to_string(),
                redelivered: message.redelivered,
            },
            props: message.props.clone(),
            body: message.body.clone(),
        };
        state.inflight.insert(
            tag,
            Inflight {
                queue: queue.to_string(),
                message,
            },
        );
        debug!(%queue, delivery_tag = tag, "delivery fetched");
        Some(raw)
    }

    /// Tags positively acknowledged so far, in call order.
    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().acked.clone()
    }

    /// `(tag, requeue)` pairs negatively acknowledged so far, in call order.
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.state.lock().nacked.clone()
    }

    /// Messages waiting in `queue`.
    pub fn depth(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Deliveries fetched but not yet acknowledged.
    pub fn inflight(&self) -> usize {
        self.state.lock().inflight.len()
    }

    /// Simulate a broken connection: every later channel operation fails
    /// with `ChannelError::Closed`.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }
}

impl ChannelFactory for MemBroker {
    fn acquire(&self) -> Result<Arc<dyn AckChannel>, ChannelError> {
        if self.state.lock().closed {
            return Err(ChannelError::Closed);
        }
        Ok(Arc::new(MemChannel {
            state: self.state.clone(),
        }))
    }
}

/// Acknowledgment surface over one broker's shared state.
pub struct MemChannel {
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl AckChannel for MemChannel {
    async fn basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        for tag in state.covered_tags(delivery_tag, multiple) {
            if state.inflight.remove(&tag).is_none() {
                return Err(ChannelError::UnknownDeliveryTag(tag));
            }
            state.acked.push(tag);
        }
        Ok(())
    }

    async fn basic_nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        for tag in state.covered_tags(delivery_tag, multiple) {
            let Some(inflight) = state.inflight.remove(&tag) else {
                return Err(ChannelError::UnknownDeliveryTag(tag));
            };
            state.nacked.push((tag, requeue));
            if requeue {
                // Redeliveries go to the front so retry order matches the
                // original delivery order.
                let mut message = inflight.message;
                message.redelivered = true;
                state
                    .queues
                    .entry(inflight.queue)
                    .or_default()
                    .push_front(message);
            }
        }
        Ok(())
    }
}
