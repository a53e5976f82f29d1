//! RPC-style consumption: requests carry a `reply_to` address and a
//! correlation id; the handler publishes its response through a reply
//! producer, and the caller matches responses by correlation id.
//!
//! ```sh
//! cargo run --example rpc_reply
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use entrega_core::consumer::{Consumer, Handler};
use entrega_core::context::{Context, ContextConfig};
use entrega_core::error::{BoxError, ChannelError};
use entrega_core::message::{Message, Properties};
use entrega_core::reply::ReplyProducer;
use entrega_mem::MemBroker;

/// Publishes replies back onto the in-memory broker.
struct MemReplyProducer {
    broker: MemBroker,
}

#[async_trait]
impl ReplyProducer for MemReplyProducer {
    async fn reply(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), ChannelError> {
        let mut props = Properties::default();
        props.correlation_id = correlation_id.map(str::to_string);
        self.broker.publish(reply_to, props, body);
        Ok(())
    }
}

/// Squares the request's `n` and replies with the result.
struct SquareHandler {
    reply: Arc<MemReplyProducer>,
}

#[async_trait]
impl Handler for SquareHandler {
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        let n = message.payload()["n"].as_i64().unwrap_or(0);
        let response = serde_json::json!({ "n": n, "squared": n * n });

        let reply_to = message.props().reply_to.as_deref().unwrap_or("replies");
        self.reply
            .reply(
                reply_to,
                message.props().correlation_id.as_deref(),
                response.to_string().into_bytes(),
            )
            .await?;

        message.ack().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    entrega_core::telemetry::try_init_tracing();

    let broker = MemBroker::new();
    let context = Context::new(ContextConfig::default(), Arc::new(broker.clone()));
    let producer = Arc::new(MemReplyProducer {
        broker: broker.clone(),
    });
    let consumer = Consumer::builder("squares")
        .handler(SquareHandler {
            reply: producer.clone(),
        })
        .reply_producer(MemReplyProducer {
            broker: broker.clone(),
        })
        .start(&context)?;

    // Publish 3 requests, each with a fresh correlation id
    println!("Publishing requests:");
    for n in [3, 7, 12] {
        let mut props = Properties::default();
        props.reply_to = Some("replies".to_string());
        props.correlation_id = Some(consumer.ids().next_id());
        println!("  n={n} correlation_id={}", props.correlation_id.as_deref().unwrap_or(""));
        broker.publish(
            "squares",
            props,
            serde_json::json!({ "n": n }).to_string().into_bytes(),
        );
    }

    while let Some(raw) = broker.fetch("squares", "rpc-worker") {
        consumer.handle_delivery(raw).await;
    }

    println!("\nReplies:");
    while let Some(reply) = broker.fetch("replies", "caller") {
        let body: serde_json::Value = serde_json::from_slice(&reply.body)?;
        println!(
            "  {} -> {} (correlation_id={})",
            body["n"],
            body["squared"],
            reply.props.correlation_id.as_deref().unwrap_or("")
        );
    }

    consumer.destroy().await;
    Ok(())
}
