#![allow(dead_code)]

use std::sync::Arc;

use entrega_core::consumer::{Consumer, ConsumerBuilder};
use entrega_core::context::{Context, ContextConfig};
use entrega_core::message::Properties;
use entrega_mem::MemBroker;

/// Broker plus context pair every e2e test starts from.
pub fn setup() -> (MemBroker, Context) {
    let broker = MemBroker::new();
    let context = Context::new(ContextConfig::default(), Arc::new(broker.clone()));
    (broker, context)
}

/// Start a consumer against the context, panicking on misconfiguration.
pub fn start(builder: ConsumerBuilder, context: &Context) -> Arc<Consumer> {
    Arc::new(builder.start(context).expect("start consumer"))
}

/// Publish a JSON payload with default properties.
pub fn publish_json(broker: &MemBroker, queue: &str, value: serde_json::Value) {
    broker.publish(queue, Properties::default(), value.to_string().into_bytes());
}

/// Publish a JSON payload with explicit properties.
pub fn publish_with_props(
    broker: &MemBroker,
    queue: &str,
    props: Properties,
    value: serde_json::Value,
) {
    broker.publish(queue, props, value.to_string().into_bytes());
}

/// Drive queued deliveries through the consumer, sequentially, until the
/// queue is empty. Requeued messages are fetched again.
pub async fn drain(broker: &MemBroker, consumer: &Consumer, queue: &str) -> usize {
    let mut dispatched = 0;
    while let Some(raw) = broker.fetch(queue, "e2e-consumer") {
        consumer.handle_delivery(raw).await;
        dispatched += 1;
    }
    dispatched
}

/// Dispatch at most `limit` deliveries, for flows that requeue forever.
pub async fn drain_up_to(
    broker: &MemBroker,
    consumer: &Consumer,
    queue: &str,
    limit: usize,
) -> usize {
    let mut dispatched = 0;
    while dispatched < limit {
        let Some(raw) = broker.fetch(queue, "e2e-consumer") else {
            break;
        };
        consumer.handle_delivery(raw).await;
        dispatched += 1;
    }
    dispatched
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_millis() as u64
}
